use std::sync::Arc;

use snip_core::{Storage, UrlId};
use snip_deleter::DeleteQueue;

use crate::identity::CookieSigner;

#[derive(Clone)]
pub struct AppState {
    storage: Arc<dyn Storage>,
    deletes: DeleteQueue,
    signer: CookieSigner,
    base_url: Arc<str>,
    cookie_domain: Arc<str>,
}

impl AppState {
    pub fn new(
        storage: Arc<dyn Storage>,
        deletes: DeleteQueue,
        signer: CookieSigner,
        public_base_url: impl AsRef<str>,
        cookie_domain: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            storage,
            deletes,
            signer,
            base_url: public_base_url.as_ref().trim_end_matches('/').into(),
            cookie_domain: cookie_domain.into(),
        }
    }

    pub fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    pub fn deletes(&self) -> &DeleteQueue {
        &self.deletes
    }

    pub fn signer(&self) -> &CookieSigner {
        &self.signer
    }

    pub fn cookie_domain(&self) -> &str {
        &self.cookie_domain
    }

    /// Renders the public short URL of `id`.
    pub fn short_url(&self, id: UrlId) -> String {
        format!("{}/{id}", self.base_url)
    }
}
