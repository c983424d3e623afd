// src/wallet.rs

use ethers::prelude::Address;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Currently connected wallet, if any.
///
/// Wallet provider selection and session persistence live outside this
/// crate; they only report the connected address here. Clones share the
/// same session.
#[derive(Debug, Clone)]
pub struct WalletSession {
    address: Arc<watch::Sender<Option<Address>>>,
}

impl Default for WalletSession {
    fn default() -> Self {
        Self::new()
    }
}

impl WalletSession {
    pub fn new() -> Self {
        let (address, _) = watch::channel(None);
        Self {
            address: Arc::new(address),
        }
    }

    pub fn connect(&self, address: Address) {
        info!(%address, "wallet connected");
        self.address.send_replace(Some(address));
    }

    pub fn disconnect(&self) {
        if self.address.send_replace(None).is_some() {
            info!("wallet disconnected");
        }
    }

    pub fn address(&self) -> Option<Address> {
        *self.address.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.address().is_some()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Address>> {
        self.address.subscribe()
    }
}
