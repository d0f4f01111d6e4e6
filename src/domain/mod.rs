//! Core entities shared by every pipeline component (spec §3 "Data Model").

pub mod evidence;
pub mod job;
pub mod progress;
pub mod report;
pub mod scan;
pub mod stage;
pub mod thesis;

pub use evidence::{
    Capability, Evidence, EvidenceCollection, EvidenceCollectionStatus, EvidenceContent,
    EvidenceMetadata, EvidenceType, PillarQualitySummary, SourceDescriptor,
};
pub use job::{CollectorJob, JobStatus};
pub use progress::{ProgressEvent, ProgressEventKind};
pub use report::{Citation, Finding, Report, ReportSection};
pub use scan::{AnalysisDepth, Company, ScanRequest, ScanStatus};
pub use stage::{Stage, StageResult, StageStatus};
pub use thesis::{Pillar, Thesis};
