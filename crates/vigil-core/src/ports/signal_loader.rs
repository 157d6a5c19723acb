//! SignalLoader port: raw recording behind an upload.

use crate::domain::{Recording, Upload};
use crate::error::Result;

pub trait SignalLoader: Send + Sync {
    fn load(&self, upload: &Upload) -> Result<Recording>;
}
