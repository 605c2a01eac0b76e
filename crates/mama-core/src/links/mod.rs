//! Link governance and auto-link cleanup.

mod cleanup;
mod governance;

pub use cleanup::{
    sha256_hex, AutoLinkScan, BackupInfo, BackupManifest, CleanupReport, CleanupRun,
    CleanupStatus, CleanupValidation, DeprecationRun, RestoreOutcome, RiskLevel,
};
