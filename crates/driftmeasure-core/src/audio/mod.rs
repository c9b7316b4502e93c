//! Audio analysis module
//!
//! This module contains the drift measurement pipeline:
//! - Rolling frame storage with absolute positions ([`history`])
//! - Thresholded maximum search ([`peak`])
//! - Current/last drift datasets and the undetected-peak policy ([`dataset`])
//! - CSV record formatting and the output boundary ([`record`])
//! - The SEARCH/ANALYSIS state machine ([`analyzer`])

pub mod analyzer;
pub mod dataset;
pub mod history;
pub mod peak;
pub mod record;
