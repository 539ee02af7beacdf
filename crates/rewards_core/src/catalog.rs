use shared::domain::{Voucher, VoucherCategory, VoucherId};

/// Read-only list of redeemable rewards. Never mutated after session start.
#[derive(Debug, Clone, Default)]
pub struct VoucherCatalog {
    vouchers: Vec<Voucher>,
}

impl VoucherCatalog {
    pub fn new(vouchers: Vec<Voucher>) -> Self {
        Self { vouchers }
    }

    pub fn all(&self) -> &[Voucher] {
        &self.vouchers
    }

    pub fn get(&self, id: &VoucherId) -> Option<&Voucher> {
        self.vouchers.iter().find(|voucher| &voucher.id == id)
    }

    pub fn by_category(&self, category: VoucherCategory) -> impl Iterator<Item = &Voucher> {
        self.vouchers
            .iter()
            .filter(move |voucher| voucher.category == category)
    }

    /// UI gating only; the ledger re-checks at redeem time.
    pub fn affordable(voucher: &Voucher, balance: u64) -> bool {
        balance >= voucher.points_cost
    }

    pub fn affordable_for(&self, balance: u64) -> impl Iterator<Item = &Voucher> {
        self.vouchers
            .iter()
            .filter(move |voucher| Self::affordable(voucher, balance))
    }
}
