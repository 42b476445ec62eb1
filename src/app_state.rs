use std::sync::Arc;

use actix::Addr;

use crate::config::Config;
use crate::hub::Hub;
use crate::media::MediaStore;
use crate::store::ConversationStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ConversationStore>,
    pub media: Arc<dyn MediaStore>,
    pub hub: Addr<Hub>,
    pub config: Config,
}
