use crate::background::Background;

use super::session::PageSession;

#[derive(Clone)]
pub(crate) struct ServerState {
    pub(crate) background: Background,
    pub(crate) session: PageSession,
}
