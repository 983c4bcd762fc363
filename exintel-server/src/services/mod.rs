//! Service modules for the feature matrix
//!
//! Every matrix status write goes through `reconciler`; the other services
//! are its call sites or read models.

pub mod ai_client;
pub mod classification;
pub mod feature_category_map;
pub mod matrix_editor;
pub mod matrix_importer;
pub mod matrix_view;
pub mod reconciler;
pub mod screenshot_store;
pub mod spreadsheet;
pub mod suggestion_manager;
pub mod suggestion_sweep;

pub use ai_client::{AiError, ChatModel, ChatRequest, XaiClient};
pub use classification::{BatchReport, BatchSelection, Classifier, ClassifyError, ClassifyOutcome};
pub use matrix_importer::{import_spreadsheet, ImportError, ImportSummary};
pub use reconciler::{reconcile, CellChange, ReconcileOutcome, Reconciled};
pub use screenshot_store::{FsScreenshotStore, ScreenshotStore, StoreError};
pub use suggestion_manager::{create_suggestion, resolve_suggestions, ResolveAction, ResolveResult};
pub use suggestion_sweep::{SuggestionSweep, SweepReport};
