//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::adapters::{DbAdapter, WhatsAppLink};
use crate::config::Config;
use std::sync::Arc;
use tailordesk_core::ports::{AuthStore, SpeechToTextService, TextToSpeechService};
use tailordesk_core::{DocumentAccess, DocumentWorkflow, OrderDesk, PartnerOnboarding};

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DbAdapter>,
    pub config: Arc<Config>,
    pub auth: Arc<dyn AuthStore>,
    pub documents: DocumentWorkflow,
    pub access: DocumentAccess,
    pub partners: PartnerOnboarding,
    pub orders: OrderDesk,
    /// `None` when no OpenAI key is configured.
    pub sst_adapter: Option<Arc<dyn SpeechToTextService>>,
    pub tts_adapter: Option<Arc<dyn TextToSpeechService>>,
    pub whatsapp: Option<WhatsAppLink>,
}

impl AppState {
    /// Wires every core service to the one database adapter.
    pub fn new(db: Arc<DbAdapter>, config: Arc<Config>) -> Self {
        let whatsapp = config.whatsapp_number.as_deref().and_then(WhatsAppLink::new);
        Self {
            auth: db.clone(),
            documents: DocumentWorkflow::new(db.clone()),
            access: DocumentAccess::new(db.clone(), db.clone(), config.access_policy()),
            partners: PartnerOnboarding::new(db.clone(), db.clone(), db.clone()),
            orders: OrderDesk::new(db.clone(), db.clone()),
            sst_adapter: None,
            tts_adapter: None,
            whatsapp,
            db,
            config,
        }
    }

    pub fn with_speech(
        mut self,
        sst_adapter: Arc<dyn SpeechToTextService>,
        tts_adapter: Arc<dyn TextToSpeechService>,
    ) -> Self {
        self.sst_adapter = Some(sst_adapter);
        self.tts_adapter = Some(tts_adapter);
        self
    }
}
