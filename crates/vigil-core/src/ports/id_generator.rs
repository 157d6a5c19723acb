//! IdGenerator port.
//!
//! Task codes and record ids are ULIDs whose timestamp part comes from the
//! injected `Clock`, so a `FixedClock` yields ids with a known time prefix.

use ulid::Ulid;

use crate::domain::{
    CompanyConfigurationId, CompanyId, DatasourceConfigurationId, Id, IdMarker, TaskCode,
    UploadCode,
};
use crate::ports::Clock;

pub trait IdGenerator: Send + Sync {
    fn generate_task_code(&self) -> TaskCode;

    fn generate_upload_code(&self) -> UploadCode;

    fn generate_company_id(&self) -> CompanyId;

    fn generate_company_configuration_id(&self) -> CompanyConfigurationId;

    fn generate_datasource_configuration_id(&self) -> DatasourceConfigurationId;
}

pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }

    fn next_id<T: IdMarker>(&self) -> Id<T> {
        Id::from_ulid(self.next_ulid())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_task_code(&self) -> TaskCode {
        TaskCode::new(self.next_ulid().to_string())
    }

    fn generate_upload_code(&self) -> UploadCode {
        UploadCode::new(self.next_ulid().to_string())
    }

    fn generate_company_id(&self) -> CompanyId {
        self.next_id()
    }

    fn generate_company_configuration_id(&self) -> CompanyConfigurationId {
        self.next_id()
    }

    fn generate_datasource_configuration_id(&self) -> DatasourceConfigurationId {
        self.next_id()
    }
}
