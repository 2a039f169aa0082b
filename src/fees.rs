//! Platform fee arithmetic for financial reporting.
//!
//! All values are integer minor currency units. The platform takes a 5%
//! service fee on every approved payment and owes 15% VAT on that fee.
//! Rounding (half-up) happens per payment, before summation: the books are
//! kept per payment, so the aggregate is the sum of rounded per-payment
//! figures, which can drift from rounding the grand total once.

/// 5% of `amount`, rounded half-up.
pub fn service_fee(amount: i64) -> i64 {
    (amount * 5 + 50) / 100
}

/// 15% of `fee`, rounded half-up.
pub fn vat(fee: i64) -> i64 {
    (fee * 15 + 50) / 100
}

/// Rollup of all approved payments.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Summary {
    /// Sum of approved payment amounts.
    pub revenue: i64,

    /// Sum of per-payment service fees.
    pub service_fee: i64,

    /// Sum of per-payment VAT on the service fee.
    pub vat: i64,

    /// What the platform keeps: fees minus VAT.
    pub admin_profit: i64,
}

impl Summary {
    pub fn from_amounts(amounts: impl IntoIterator<Item = i64>) -> Self {
        let mut summary = Self::default();
        for amount in amounts {
            let fee = service_fee(amount);
            summary.revenue += amount;
            summary.service_fee += fee;
            summary.vat += vat(fee);
        }
        summary.admin_profit = summary.service_fee - summary.vat;
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::{service_fee, vat, Summary};

    #[test]
    fn reference_breakdown_of_a_hundred_birr() {
        // 100.00 in cents.
        let amount = 10000;
        let fee = service_fee(amount);
        assert_eq!(fee, 500);
        assert_eq!(vat(fee), 75);
        assert_eq!(fee - vat(fee), 425);
    }

    #[test]
    fn rounds_half_up_per_payment() {
        assert_eq!(service_fee(10), 1); // 0.5 rounds up
        assert_eq!(service_fee(9), 0); // 0.45 rounds down
        assert_eq!(vat(3), 0); // 0.45 rounds down
        assert_eq!(vat(10), 2); // 1.5 rounds up
    }

    #[test]
    fn summary_folds_per_payment() {
        let summary = Summary::from_amounts([10000, 10000, 10]);
        assert_eq!(
            summary,
            Summary {
                revenue: 20010,
                service_fee: 1001,
                vat: 150,
                admin_profit: 851,
            },
        );
    }

    #[test]
    fn per_payment_rounding_can_drift_from_aggregate_rounding() {
        // Ten payments of 0.10 each: per-payment fees round 0.005 up to
        // 0.01 apiece, while 5% of the 1.00 total would round to 0.05.
        let summary = Summary::from_amounts(std::iter::repeat(10).take(10));
        assert_eq!(summary.service_fee, 10);
        assert_eq!(service_fee(summary.revenue), 5);
    }

    #[test]
    fn empty_set_is_all_zero() {
        assert_eq!(Summary::from_amounts([]), Summary::default());
    }
}
