#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

pub mod config;
pub mod data;
pub mod edges;
pub mod family;
pub mod iwls;
pub mod linalg;
pub mod report;
pub mod surface;

pub use config::{DiffReduction, IwlsConfig};
pub use family::{Family, Link};
pub use iwls::{IwlsError, IwlsRequest, IwlsResult, IwlsStatus, iwls};
pub use linalg::LocalWeights;
