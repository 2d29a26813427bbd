use std::sync::Arc;

use crate::mutation::MutationHandler;

pub(crate) struct ApiServerState {
    pub(crate) mutation_handler: Arc<MutationHandler>,
}
