//! Number-series store port and in-memory adapter

use async_trait::async_trait;
use std::collections::HashMap;

use core_kernel::{FiscalYear, OrgId, StoreError};

use crate::series::{DocModule, NumberSeries};

/// Name of the uniqueness constraint on `(org, module, fiscal_year)`.
pub const SERIES_KEY_CONSTRAINT: &str = "number_series_org_module_fy";

/// Persistence port for number series rows.
///
/// Implementations are transaction-scoped: every method runs inside the
/// caller's transaction, so an aborted document creation also rolls back
/// its counter increment.
#[async_trait]
pub trait SeriesStore: Send {
    async fn find_series(
        &mut self,
        org_id: OrgId,
        module: DocModule,
        fiscal_year: FiscalYear,
    ) -> Result<Option<NumberSeries>, StoreError>;

    /// Inserts a new series row. Fails with a unique-violation
    /// [`StoreError::Conflict`] if the `(org, module, fiscal_year)` row
    /// already exists.
    async fn insert_series(&mut self, series: NumberSeries) -> Result<(), StoreError>;

    async fn set_current_number(
        &mut self,
        org_id: OrgId,
        module: DocModule,
        fiscal_year: FiscalYear,
        current_number: i64,
    ) -> Result<(), StoreError>;
}

/// In-memory adapter, used by tests and the in-process transaction.
#[derive(Debug, Default)]
pub struct MemorySeriesStore {
    rows: HashMap<(OrgId, DocModule, FiscalYear), NumberSeries>,
}

impl MemorySeriesStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SeriesStore for MemorySeriesStore {
    async fn find_series(
        &mut self,
        org_id: OrgId,
        module: DocModule,
        fiscal_year: FiscalYear,
    ) -> Result<Option<NumberSeries>, StoreError> {
        Ok(self.rows.get(&(org_id, module, fiscal_year)).cloned())
    }

    async fn insert_series(&mut self, series: NumberSeries) -> Result<(), StoreError> {
        let key = (series.org_id, series.module, series.fiscal_year);
        if self.rows.contains_key(&key) {
            return Err(StoreError::conflict(
                SERIES_KEY_CONSTRAINT,
                format!("series already exists for {:?}", key),
            ));
        }
        self.rows.insert(key, series);
        Ok(())
    }

    async fn set_current_number(
        &mut self,
        org_id: OrgId,
        module: DocModule,
        fiscal_year: FiscalYear,
        current_number: i64,
    ) -> Result<(), StoreError> {
        let row = self
            .rows
            .get_mut(&(org_id, module, fiscal_year))
            .ok_or_else(|| StoreError::not_found("NumberSeries", format!("{org_id}/{module}/{fiscal_year}")))?;
        row.current_number = current_number;
        Ok(())
    }
}
