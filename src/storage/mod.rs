//! Storage engine for Recall
//!
//! Record files partitioned by type, the codec that reads and writes them,
//! and the metadata counters that track store state.

pub mod codec;
pub mod layout;
mod records;

pub use codec::{decode, decode_with_report, encode, DecodedRecord};
pub use records::{RecordStore, ScanIssue, ScanReport, ScanWarning};
