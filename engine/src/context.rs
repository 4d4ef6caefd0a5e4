use crate::{Cache, Client, Error, Result};

/// Collaborators shared by every entity and list built from one root.
#[derive(Debug, Clone)]
pub struct Context {
    client: Option<Client>,
    cache: Cache,
}

impl Context {
    pub fn new(client: Client, cache: Cache) -> Self {
        Self {
            client: Some(client),
            cache,
        }
    }

    /// A context without a client; only `no_store` entities can use it.
    pub fn detached(cache: Cache) -> Self {
        Self {
            client: None,
            cache,
        }
    }

    pub fn client(&self) -> Option<&Client> {
        self.client.as_ref()
    }

    pub(crate) fn require_client(&self, owner: &str) -> Result<Client> {
        self.client
            .clone()
            .ok_or_else(|| Error::MissingClient(owner.to_string()))
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }
}
