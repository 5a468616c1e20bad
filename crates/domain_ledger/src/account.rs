//! Chart of accounts
//!
//! Accounts are seeded once at organization setup and mutated only by
//! the posting engine; `balance` is a running signed total with the
//! debit-positive convention (every posted line adds `debit - credit`).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::{AccountId, OrgId};

/// Types of accounts in the chart of accounts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    /// Asset accounts (debit normal balance)
    Asset,
    /// Liability accounts (credit normal balance)
    Liability,
    /// Equity accounts (credit normal balance)
    Equity,
    /// Income accounts (credit normal balance)
    Income,
    /// Expense accounts (debit normal balance)
    Expense,
}

impl AccountType {
    /// Returns true if this account type has a debit normal balance
    pub fn is_debit_normal(&self) -> bool {
        matches!(self, AccountType::Asset | AccountType::Expense)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Asset => "asset",
            AccountType::Liability => "liability",
            AccountType::Equity => "equity",
            AccountType::Income => "income",
            AccountType::Expense => "expense",
        }
    }
}

/// An account in the chart of accounts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub org_id: OrgId,
    /// Account code (e.g., "1100")
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    /// Running signed balance, debit-positive
    pub balance: Decimal,
}

impl Account {
    pub fn new(
        id: AccountId,
        org_id: OrgId,
        code: impl Into<String>,
        name: impl Into<String>,
        account_type: AccountType,
    ) -> Self {
        Self {
            id,
            org_id,
            code: code.into(),
            name: name.into(),
            account_type,
            balance: Decimal::ZERO,
        }
    }
}

/// Well-known account codes the workflows post against.
pub mod codes {
    pub const CASH: &str = "1000";
    pub const BANK: &str = "1010";
    pub const ACCOUNTS_RECEIVABLE: &str = "1100";
    pub const OUTPUT_CGST: &str = "2100";
    pub const OUTPUT_SGST: &str = "2110";
    pub const OUTPUT_IGST: &str = "2120";
    pub const CUSTOMER_ADVANCES: &str = "2200";
    pub const RETAINED_EARNINGS: &str = "3000";
    pub const SALES: &str = "4000";
    pub const GENERAL_EXPENSE: &str = "5000";
}

/// Standard chart of accounts seeded for a GST organization
pub struct GstChartOfAccounts;

impl GstChartOfAccounts {
    pub fn standard(org_id: OrgId) -> Vec<Account> {
        vec![
            // Assets
            Account::new(AccountId::new(), org_id, codes::CASH, "Cash", AccountType::Asset),
            Account::new(AccountId::new(), org_id, codes::BANK, "Bank", AccountType::Asset),
            Account::new(
                AccountId::new(),
                org_id,
                codes::ACCOUNTS_RECEIVABLE,
                "Accounts Receivable",
                AccountType::Asset,
            ),
            // Liabilities
            Account::new(
                AccountId::new(),
                org_id,
                codes::OUTPUT_CGST,
                "Output CGST Payable",
                AccountType::Liability,
            ),
            Account::new(
                AccountId::new(),
                org_id,
                codes::OUTPUT_SGST,
                "Output SGST Payable",
                AccountType::Liability,
            ),
            Account::new(
                AccountId::new(),
                org_id,
                codes::OUTPUT_IGST,
                "Output IGST Payable",
                AccountType::Liability,
            ),
            Account::new(
                AccountId::new(),
                org_id,
                codes::CUSTOMER_ADVANCES,
                "Customer Advances",
                AccountType::Liability,
            ),
            // Equity
            Account::new(
                AccountId::new(),
                org_id,
                codes::RETAINED_EARNINGS,
                "Retained Earnings",
                AccountType::Equity,
            ),
            // Income
            Account::new(AccountId::new(), org_id, codes::SALES, "Sales", AccountType::Income),
            // Expenses
            Account::new(
                AccountId::new(),
                org_id,
                codes::GENERAL_EXPENSE,
                "General Expense",
                AccountType::Expense,
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_type_is_debit_normal() {
        assert!(AccountType::Asset.is_debit_normal());
        assert!(AccountType::Expense.is_debit_normal());
        assert!(!AccountType::Liability.is_debit_normal());
        assert!(!AccountType::Equity.is_debit_normal());
        assert!(!AccountType::Income.is_debit_normal());
    }

    #[test]
    fn test_standard_chart_has_unique_codes() {
        let chart = GstChartOfAccounts::standard(OrgId::new());
        let mut codes: Vec<_> = chart.iter().map(|a| a.code.clone()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), chart.len());
        assert!(chart.iter().all(|a| a.balance.is_zero()));
    }
}
