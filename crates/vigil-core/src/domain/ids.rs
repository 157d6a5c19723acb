//! Domain identifiers.
//!
//! Two families live here:
//! - `Id<T>`: ULID-backed record ids for companies and configurations. The
//!   marker type `T` only exists at compile time, so a `CompanyId` can never
//!   be passed where a `DatasourceConfigurationId` is expected.
//! - `TaskCode` / `UploadCode`: external string identifiers handed to the
//!   scheduler and to callers. They are opaque and compared verbatim.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// Marker trait for `Id<T>`; supplies the display prefix.
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn generate() -> Self {
        Self::from_ulid(Ulid::new())
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Company {}

impl IdMarker for Company {
    fn prefix() -> &'static str {
        "company-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CompanyConfig {}

impl IdMarker for CompanyConfig {
    fn prefix() -> &'static str {
        "cconf-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DatasourceConfig {}

impl IdMarker for DatasourceConfig {
    fn prefix() -> &'static str {
        "dsconf-"
    }
}

pub type CompanyId = Id<Company>;
pub type CompanyConfigurationId = Id<CompanyConfig>;
pub type DatasourceConfigurationId = Id<DatasourceConfig>;

/// Unique external identifier of a training, detection or diagnostic task.
///
/// A diagnostic task reuses the code of the detection it diagnoses, so codes
/// are unique per task kind, not globally.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskCode(String);

impl TaskCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of an uploaded recording.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadCode(String);

impl UploadCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UploadCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_display_with_their_prefix() {
        let ulid = Ulid::new();
        let company = CompanyId::from_ulid(ulid);
        let dsconf = DatasourceConfigurationId::from_ulid(ulid);

        assert_eq!(company.as_ulid(), dsconf.as_ulid());
        assert!(company.to_string().starts_with("company-"));
        assert!(dsconf.to_string().starts_with("dsconf-"));
        // let _: CompanyId = dsconf; // <- does not compile
    }

    #[test]
    fn ids_serialize_as_bare_ulid() {
        let id = CompanyId::generate();
        let json = serde_json::to_value(id).unwrap();
        assert_eq!(json, serde_json::Value::String(id.as_ulid().to_string()));

        let back: CompanyId = serde_json::from_value(json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn codes_are_transparent_strings() {
        let code = TaskCode::new("01HX");
        assert_eq!(serde_json::to_string(&code).unwrap(), "\"01HX\"");
        assert_eq!(code.to_string(), "01HX");
        assert_eq!(UploadCode::new("u-1").as_str(), "u-1");
    }
}
