use std::sync::Arc;

use crate::admin::editor::EditorSessions;
use crate::admin::gate::AdminGate;
use crate::data::DataService;
use crate::ocr::OcrService;
use crate::recommendation::client::Recommender;
use crate::session::IdentityProvider;
use crate::storage::FileStorage;
use crate::wizard::store::WizardStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Rows in the hosted Postgres. Default: PgDataService.
    pub data: Arc<dyn DataService>,
    pub identity: Arc<dyn IdentityProvider>,
    /// Certificate images. Default: S3FileStorage.
    pub storage: Arc<dyn FileStorage>,
    pub ocr: Arc<dyn OcrService>,
    pub recommender: Arc<dyn Recommender>,
    /// Registration wizards in progress; in memory only.
    pub wizards: WizardStore,
    /// One score editor per admin.
    pub editors: EditorSessions,
    pub admin_gate: AdminGate,
}
