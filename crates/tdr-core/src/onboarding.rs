//! Per-user onboarding: credential → destination → ready.
//!
//! State is never stored. It is derived from the record on every event, and
//! every decision re-reads the record first.

use std::{fmt, sync::Arc};

use crate::{
    credential,
    domain::UserId,
    errors::Error,
    formatting::Reply,
    record::{UserRecord, UserStore},
    Result,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum OnboardingState {
    New,
    AwaitingCredential,
    AwaitingDestination,
    Ready,
}

impl OnboardingState {
    pub fn as_str(self) -> &'static str {
        match self {
            OnboardingState::New => "new",
            OnboardingState::AwaitingCredential => "awaiting_credential",
            OnboardingState::AwaitingDestination => "awaiting_destination",
            OnboardingState::Ready => "ready",
        }
    }
}

/// The onboarding step a user still has to complete.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetupStep {
    Credential,
    Destination,
}

impl fmt::Display for SetupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetupStep::Credential => f.write_str("credential not uploaded"),
            SetupStep::Destination => f.write_str("destination folder not set"),
        }
    }
}

/// A destination only counts once a credential exists.
pub fn derive_state(record: Option<&UserRecord>) -> OnboardingState {
    let Some(record) = record else {
        return OnboardingState::New;
    };
    match (&record.credential, &record.destination_id) {
        (None, _) => OnboardingState::AwaitingCredential,
        (Some(_), None) => OnboardingState::AwaitingDestination,
        (Some(_), Some(_)) => OnboardingState::Ready,
    }
}

/// Gate for the destination-set command.
pub fn check_destination(state: OnboardingState, destination_id: &str, min_len: usize) -> Result<()> {
    if state < OnboardingState::AwaitingDestination {
        return Err(Error::MissingSetup(SetupStep::Credential));
    }
    if destination_id.chars().count() < min_len {
        return Err(Error::InvalidDestinationId { min: min_len });
    }
    Ok(())
}

/// Gate for credential uploads: allowed before a destination exists and
/// again once ready, but not while the destination is outstanding.
pub fn check_credential(state: OnboardingState) -> Result<()> {
    match state {
        OnboardingState::AwaitingDestination => Err(Error::MissingSetup(SetupStep::Destination)),
        _ => Ok(()),
    }
}

/// Gate for generic files.
pub fn check_transfer(state: OnboardingState) -> Result<()> {
    match state {
        OnboardingState::New | OnboardingState::AwaitingCredential => {
            Err(Error::MissingSetup(SetupStep::Credential))
        }
        OnboardingState::AwaitingDestination => Err(Error::MissingSetup(SetupStep::Destination)),
        OnboardingState::Ready => Ok(()),
    }
}

/// Who sent the event, as far as onboarding cares.
#[derive(Clone, Copy, Debug)]
pub struct Sender<'a> {
    pub user_id: UserId,
    pub display_name: Option<&'a str>,
}

pub struct Onboarding {
    store: Arc<dyn UserStore>,
    min_folder_id_len: usize,
}

impl Onboarding {
    pub fn new(store: Arc<dyn UserStore>, min_folder_id_len: usize) -> Self {
        Self {
            store,
            min_folder_id_len,
        }
    }

    /// Lazily create the record and return the freshly derived state.
    async fn current(&self, who: Sender<'_>) -> Result<(OnboardingState, UserRecord)> {
        let ensured = self
            .store
            .ensure_exists(who.user_id, who.display_name)
            .await?;
        if ensured.created {
            tracing::info!(user_id = %who.user_id, "new user");
            return Ok((OnboardingState::New, ensured.record));
        }
        Ok((derive_state(Some(&ensured.record)), ensured.record))
    }

    /// Re-derive the state from the stored record without creating one.
    pub async fn state_of(&self, user_id: UserId) -> Result<OnboardingState> {
        let record = self.store.get(user_id).await?;
        Ok(derive_state(record.as_ref()))
    }

    pub async fn start(&self, who: Sender<'_>) -> Result<Reply> {
        let (state, _) = self.current(who).await?;
        Ok(match state {
            OnboardingState::New => Reply::welcome(),
            other => Reply::next_step(other),
        })
    }

    pub async fn status(&self, who: Sender<'_>) -> Result<Reply> {
        // Report the derived state even on first contact: `New` never lingers.
        let (_, record) = self.current(who).await?;
        Ok(Reply::status(derive_state(Some(&record)), &record))
    }

    /// Prompt for whatever the user still has to do.
    pub async fn next_step(&self, who: Sender<'_>) -> Result<Reply> {
        let (state, _) = self.current(who).await?;
        Ok(Reply::next_step(state))
    }

    pub async fn set_destination(&self, who: Sender<'_>, raw_id: &str) -> Result<Reply> {
        let destination_id = raw_id.trim();
        let (before, _) = self.current(who).await?;
        check_destination(before, destination_id, self.min_folder_id_len)?;

        self.store
            .upsert_destination(who.user_id, destination_id)
            .await?;
        tracing::info!(user_id = %who.user_id, "destination set");

        let after = self.state_of(who.user_id).await?;
        Ok(Reply::destination_set(before == OnboardingState::Ready, after))
    }

    /// Validate and persist an uploaded credential. Nothing is written unless
    /// `parse` accepts the bytes and the user is not waiting on a destination.
    pub async fn accept_credential(&self, who: Sender<'_>, raw: &[u8]) -> Result<Reply> {
        let cred = credential::parse(raw)?;
        let principal = cred.principal().to_string();
        let (before, _) = self.current(who).await?;
        check_credential(before)?;

        self.store.upsert_credential(who.user_id, cred).await?;
        tracing::info!(user_id = %who.user_id, "credential set");

        let after = self.state_of(who.user_id).await?;
        Ok(Reply::credential_set(
            before == OnboardingState::Ready,
            after,
            &principal,
        ))
    }

    /// Fails with `MissingSetup` unless the user is `Ready`.
    pub async fn authorize_transfer(&self, who: Sender<'_>) -> Result<()> {
        let (state, _) = self.current(who).await?;
        check_transfer(state)
    }
}
