use std::sync::mpsc::{Receiver, Sender};
use std::thread::{self, JoinHandle};

use crate::backend::Backend;
use crate::error::SignInError;
use crate::state::{Delta, ProviderCommand};

/// Runs provider commands on a background thread until the command channel closes.
pub fn spawn_provider(
    tx: Sender<Delta>,
    cmd_rx: Receiver<ProviderCommand>,
    mut backend: Box<dyn Backend>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let _ = tx.send(Delta::Log(format!(
            "[INFO] Provider started ({} backend)",
            backend.name()
        )));
        while let Ok(cmd) = cmd_rx.recv() {
            for delta in run_command(backend.as_mut(), cmd) {
                if tx.send(delta).is_err() {
                    return;
                }
            }
        }
    })
}

/// Executes one command synchronously. Failures become deltas, never panics.
pub fn run_command(backend: &mut dyn Backend, cmd: ProviderCommand) -> Vec<Delta> {
    match cmd {
        ProviderCommand::FetchCatalog => match backend.fetch_catalog() {
            Ok(batch) => {
                let mut out = Vec::with_capacity(2);
                if batch.stale {
                    out.push(Delta::Log(
                        "[WARN] Catalog service unreachable, using cached copy".to_string(),
                    ));
                }
                out.push(Delta::CatalogLoaded(batch.units));
                out
            }
            Err(err) => vec![Delta::CatalogFailed(format!("{err:#}"))],
        },
        ProviderCommand::FetchOwnership { session } => {
            match backend.fetch_ownership(&session) {
                Ok(ownership) => vec![Delta::OwnershipLoaded {
                    user_id: session.user_id,
                    ownership,
                }],
                Err(err) => vec![Delta::OwnershipFailed(format!("{err:#}"))],
            }
        }
        ProviderCommand::RequestSignIn { email } => match backend.request_sign_in(&email) {
            Ok(()) => vec![Delta::SignInRequested { email }],
            Err(SignInError::Rejected(failure)) => vec![Delta::SignInFailed(failure)],
            Err(SignInError::Transport(err)) => vec![Delta::SignInUnavailable(format!("{err:#}"))],
        },
        ProviderCommand::VerifySignIn { email, code } => {
            match backend.verify_sign_in(&email, &code) {
                Ok(session) => vec![Delta::SignedIn(session)],
                Err(err) => vec![Delta::VerifyFailed(format!("{err:#}"))],
            }
        }
        ProviderCommand::SaveDeck {
            session,
            submission,
        } => match backend.save_deck(&session, &submission) {
            Ok(id) => vec![Delta::DeckSaved { id }],
            Err(err) => vec![Delta::DeckSaveFailed(format!("{err:#}"))],
        },
    }
}
