//! Content-based routing of inbound events.
//!
//! `classify` only looks at the event itself, never at the user's state; the
//! onboarding gates decide whether a route is legal right now.

use std::sync::Arc;

use crate::{
    audit::{AuditEvent, AuditLogger},
    credential::is_credential_file_name,
    domain::{FileRef, MessageId, UserId},
    errors::Error,
    formatting::Reply,
    onboarding::{Onboarding, Sender},
    ports::SourceTransport,
    transfer::{fetch_bytes, ContentKind, TransferPipeline, TransferRequest},
    Result,
};

#[derive(Clone, Debug)]
pub struct Origin {
    pub user_id: UserId,
    pub display_name: Option<String>,
}

/// What the transport saw, before any interpretation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RawContentKind {
    Document,
    Image,
    Video,
    Other(String),
}

#[derive(Clone, Debug)]
pub enum InboundEvent {
    Command {
        origin: Origin,
        name: String,
        args: String,
    },
    Text {
        origin: Origin,
    },
    File {
        origin: Origin,
        message_id: MessageId,
        kind: RawContentKind,
        file_ref: FileRef,
        file_name: Option<String>,
    },
}

impl InboundEvent {
    pub fn origin(&self) -> &Origin {
        match self {
            InboundEvent::Command { origin, .. }
            | InboundEvent::Text { origin }
            | InboundEvent::File { origin, .. } => origin,
        }
    }
}

#[derive(Clone, Debug)]
pub enum Route {
    Start,
    Help,
    Status,
    SetDestination(String),
    UnknownCommand(String),
    Text,
    CredentialUpload(FileRef),
    GenericFile(TransferRequest),
    Unsupported(String),
}

impl Route {
    pub fn label(&self) -> &'static str {
        match self {
            Route::Start => "start",
            Route::Help => "help",
            Route::Status => "status",
            Route::SetDestination(_) => "setfolder",
            Route::UnknownCommand(_) => "unknown_command",
            Route::Text => "text",
            Route::CredentialUpload(_) => "credential_upload",
            Route::GenericFile(_) => "file",
            Route::Unsupported(_) => "unsupported",
        }
    }
}

/// A document with a structured-data extension is a credential upload.
pub fn is_credential_upload(kind: &RawContentKind, file_name: Option<&str>) -> bool {
    *kind == RawContentKind::Document && file_name.is_some_and(is_credential_file_name)
}

pub fn classify(event: &InboundEvent) -> Route {
    match event {
        InboundEvent::Command { name, args, .. } => match name.as_str() {
            "start" => Route::Start,
            "help" => Route::Help,
            "status" => Route::Status,
            "setfolder" => Route::SetDestination(args.trim().to_string()),
            other => Route::UnknownCommand(other.to_string()),
        },
        InboundEvent::Text { .. } => Route::Text,
        InboundEvent::File {
            message_id,
            kind,
            file_ref,
            file_name,
            ..
        } => {
            if is_credential_upload(kind, file_name.as_deref()) {
                return Route::CredentialUpload(file_ref.clone());
            }
            let content_kind = match kind {
                RawContentKind::Document => ContentKind::Document,
                RawContentKind::Image => ContentKind::Image,
                RawContentKind::Video => ContentKind::Video,
                RawContentKind::Other(k) => return Route::Unsupported(k.clone()),
            };
            Route::GenericFile(TransferRequest::new(
                file_ref.clone(),
                file_name.as_deref(),
                content_kind,
                *message_id,
            ))
        }
    }
}

pub struct Dispatcher {
    onboarding: Onboarding,
    pipeline: TransferPipeline,
    source: Arc<dyn SourceTransport>,
    audit: Arc<AuditLogger>,
    max_credential_bytes: u64,
}

impl Dispatcher {
    pub fn new(
        onboarding: Onboarding,
        pipeline: TransferPipeline,
        source: Arc<dyn SourceTransport>,
        audit: Arc<AuditLogger>,
        max_credential_bytes: u64,
    ) -> Self {
        Self {
            onboarding,
            pipeline,
            source,
            audit,
            max_credential_bytes,
        }
    }

    /// Handle one event and produce its single reply. Never fails: every error
    /// is local to this event and becomes a user-facing message.
    pub async fn handle(&self, event: InboundEvent) -> Reply {
        let origin = event.origin().clone();
        let route = classify(&event);
        let label = route.label();
        tracing::info!(user_id = %origin.user_id, route = label, "event");

        match self.dispatch(&origin, route).await {
            Ok(reply) => reply,
            Err(e) => {
                self.record_failure(&origin, label, &e);
                Reply::from_error(&e)
            }
        }
    }

    async fn dispatch(&self, origin: &Origin, route: Route) -> Result<Reply> {
        let who = Sender {
            user_id: origin.user_id,
            display_name: origin.display_name.as_deref(),
        };

        match route {
            Route::Start => {
                let reply = self.onboarding.start(who).await?;
                self.record_state(origin, "start").await;
                Ok(reply)
            }
            Route::Help | Route::Text => self.onboarding.next_step(who).await,
            Route::Status => self.onboarding.status(who).await,
            Route::SetDestination(id) => {
                let reply = self.onboarding.set_destination(who, &id).await?;
                self.record_state(origin, "destination_set").await;
                Ok(reply)
            }
            Route::CredentialUpload(file_ref) => {
                let raw = fetch_bytes(&*self.source, &file_ref, self.max_credential_bytes).await?;
                let reply = self.onboarding.accept_credential(who, &raw).await?;
                self.record_state(origin, "credential_set").await;
                Ok(reply)
            }
            Route::GenericFile(req) => {
                self.onboarding.authorize_transfer(who).await?;
                let file_name = req.file_name.clone();
                let shared = self.pipeline.transfer(origin.user_id, req).await?;
                self.audit.record(AuditEvent::transfer(
                    origin.user_id.0,
                    origin.display_name.as_deref(),
                    &file_name,
                    &shared.object_id.0,
                ));
                Ok(Reply::transfer_done(&file_name, &shared.url))
            }
            Route::UnknownCommand(name) => Ok(Reply::unknown_command(&name)),
            Route::Unsupported(kind) => {
                tracing::debug!(user_id = %origin.user_id, kind = %kind, "unsupported content");
                Ok(Reply::unsupported())
            }
        }
    }

    async fn record_state(&self, origin: &Origin, event: &str) {
        let state = match self.onboarding.state_of(origin.user_id).await {
            Ok(s) => s.as_str(),
            Err(_) => "unknown",
        };
        self.audit.record(AuditEvent::onboarding(
            event,
            origin.user_id.0,
            origin.display_name.as_deref(),
            state,
        ));
    }

    fn record_failure(&self, origin: &Origin, route: &str, e: &Error) {
        let user_id = origin.user_id;
        let username = origin.display_name.as_deref();
        match e {
            Error::InvalidCredentialFormat(_)
            | Error::InvalidDestinationId { .. }
            | Error::MissingSetup(_) => {
                tracing::info!(%user_id, route, reason = e.kind(), "rejected");
                self.audit
                    .record(AuditEvent::rejected(user_id.0, username, e.kind()));
            }
            _ => {
                tracing::warn!(%user_id, route, error_kind = e.kind(), "event failed: {e}");
                self.audit.record(AuditEvent::error(
                    user_id.0,
                    username,
                    e.kind(),
                    &e.to_string(),
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        credential::fixtures::{service_account, service_account_json},
        formatting::ReplyKind,
        onboarding::{derive_state, OnboardingState},
        record::{MemoryUserStore, UserStore},
        staging::StagingArea,
        transfer::fakes::{FakeDestination, FakeSource},
    };

    const FOLDER: &str = "xxxxxxxxxxxxxxxxxxxx";

    struct Bot {
        _root: tempfile::TempDir,
        staging: Arc<StagingArea>,
        store: Arc<MemoryUserStore>,
        dest: Arc<FakeDestination>,
        dispatcher: Dispatcher,
    }

    async fn bot(source: FakeSource, dest: FakeDestination) -> Bot {
        let root = tempfile::tempdir().unwrap();
        let staging = Arc::new(StagingArea::new(root.path().join("downloads")));
        staging.prepare().await.unwrap();
        let store = Arc::new(MemoryUserStore::new());
        let source: Arc<dyn SourceTransport> = Arc::new(source);
        let dest = Arc::new(dest);
        let audit = Arc::new(AuditLogger::new(root.path().join("audit.log"), true));

        let dispatcher = Dispatcher::new(
            Onboarding::new(store.clone(), 20),
            TransferPipeline::new(
                store.clone(),
                source.clone(),
                dest.clone(),
                staging.clone(),
                "https://drive.google.com",
            ),
            source,
            audit,
            64 * 1024,
        );
        Bot {
            _root: root,
            staging,
            store,
            dest,
            dispatcher,
        }
    }

    fn origin(id: i64) -> Origin {
        Origin {
            user_id: UserId(id),
            display_name: Some("alice".to_string()),
        }
    }

    fn command(id: i64, name: &str, args: &str) -> InboundEvent {
        InboundEvent::Command {
            origin: origin(id),
            name: name.to_string(),
            args: args.to_string(),
        }
    }

    fn file(id: i64, kind: RawContentKind, file_ref: &str, name: Option<&str>) -> InboundEvent {
        InboundEvent::File {
            origin: origin(id),
            message_id: MessageId(31),
            kind,
            file_ref: FileRef(file_ref.to_string()),
            file_name: name.map(str::to_string),
        }
    }

    impl Bot {
        async fn state(&self, id: i64) -> OnboardingState {
            derive_state(self.store.get(UserId(id)).await.unwrap().as_ref())
        }

        async fn make_ready(&self, id: i64) {
            self.store
                .upsert_credential(UserId(id), service_account())
                .await
                .unwrap();
            self.store.upsert_destination(UserId(id), FOLDER).await.unwrap();
        }

        fn staging_is_empty(&self) -> bool {
            std::fs::read_dir(self.staging.dir()).unwrap().count() == 0
        }
    }

    #[test]
    fn classification_is_content_based() {
        let cred = file(1, RawContentKind::Document, "f", Some("creds.JSON"));
        assert!(matches!(classify(&cred), Route::CredentialUpload(_)));

        let doc = file(1, RawContentKind::Document, "f", Some("notes.txt"));
        assert!(matches!(classify(&doc), Route::GenericFile(r) if r.file_name == "notes.txt"));

        let photo = file(1, RawContentKind::Image, "f", Some("x.json"));
        assert!(
            matches!(classify(&photo), Route::GenericFile(r) if r.content_kind == ContentKind::Image),
            "only documents can carry credentials"
        );

        let unnamed = file(1, RawContentKind::Image, "f", None);
        assert!(matches!(classify(&unnamed), Route::GenericFile(r) if r.file_name == "photo_31.jpg"));

        let voice = file(1, RawContentKind::Other("voice".to_string()), "f", None);
        assert!(matches!(classify(&voice), Route::Unsupported(k) if k == "voice"));

        assert!(matches!(
            classify(&command(1, "setfolder", "  abc  ")),
            Route::SetDestination(id) if id == "abc"
        ));
        assert!(matches!(classify(&command(1, "nope", "")), Route::UnknownCommand(_)));
    }

    #[tokio::test]
    async fn start_from_nothing_welcomes_and_awaits_credential() {
        let b = bot(FakeSource::default(), FakeDestination::default()).await;
        let reply = b.dispatcher.handle(command(1, "start", "")).await;
        assert_eq!(reply, Reply::welcome());
        assert_eq!(b.state(1).await, OnboardingState::AwaitingCredential);

        let rec = b.store.get(UserId(1)).await.unwrap().unwrap();
        assert_eq!(rec.display_name.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn image_before_credentials_is_rejected() {
        let b = bot(
            FakeSource::default().with_file("p", b"jpeg"),
            FakeDestination::default(),
        )
        .await;
        b.dispatcher.handle(command(1, "start", "")).await;
        let before = b.store.get(UserId(1)).await.unwrap();

        let reply = b
            .dispatcher
            .handle(file(1, RawContentKind::Image, "p", None))
            .await;
        assert_eq!(reply.kind, ReplyKind::Error);
        assert!(reply.html.contains("credentials"));
        assert_eq!(b.store.get(UserId(1)).await.unwrap(), before);
        assert!(b.dest.uploads().is_empty());
    }

    #[tokio::test]
    async fn credential_upload_moves_to_awaiting_destination() {
        let b = bot(
            FakeSource::default().with_file("c", service_account_json().as_bytes()),
            FakeDestination::default(),
        )
        .await;
        b.dispatcher.handle(command(1, "start", "")).await;

        let reply = b
            .dispatcher
            .handle(file(1, RawContentKind::Document, "c", Some("credentials.json")))
            .await;
        assert_eq!(reply.kind, ReplyKind::Prompt);
        assert!(reply.html.contains("/setfolder"));
        assert_eq!(b.state(1).await, OnboardingState::AwaitingDestination);
    }

    #[tokio::test]
    async fn malformed_credential_upload_changes_nothing() {
        let b = bot(
            FakeSource::default().with_file("c", b"{\"type\":\"service_account\"}"),
            FakeDestination::default(),
        )
        .await;
        let reply = b
            .dispatcher
            .handle(file(1, RawContentKind::Document, "c", Some("key.json")))
            .await;
        assert_eq!(reply.kind, ReplyKind::Error);
        assert!(b.store.get(UserId(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn setfolder_completes_onboarding() {
        let b = bot(
            FakeSource::default().with_file("c", service_account_json().as_bytes()),
            FakeDestination::default(),
        )
        .await;
        b.dispatcher
            .handle(file(1, RawContentKind::Document, "c", Some("credentials.json")))
            .await;

        let reply = b.dispatcher.handle(command(1, "setfolder", "short")).await;
        assert_eq!(reply.kind, ReplyKind::Error);
        assert_eq!(b.state(1).await, OnboardingState::AwaitingDestination);

        let reply = b.dispatcher.handle(command(1, "setfolder", FOLDER)).await;
        assert_eq!(reply.kind, ReplyKind::Success);
        assert_eq!(b.state(1).await, OnboardingState::Ready);
    }

    #[tokio::test]
    async fn setfolder_before_credentials_is_rejected() {
        let b = bot(FakeSource::default(), FakeDestination::default()).await;
        let reply = b.dispatcher.handle(command(1, "setfolder", FOLDER)).await;
        assert_eq!(reply.kind, ReplyKind::Error);
        let rec = b.store.get(UserId(1)).await.unwrap().unwrap();
        assert!(rec.destination_id.is_none());
    }

    #[tokio::test]
    async fn ready_user_document_is_relayed() {
        let b = bot(
            FakeSource::default().with_file("d", b"hello drive"),
            FakeDestination::default(),
        )
        .await;
        b.make_ready(1).await;

        let reply = b
            .dispatcher
            .handle(file(1, RawContentKind::Document, "d", Some("notes.txt")))
            .await;
        assert_eq!(reply.kind, ReplyKind::Success);
        assert!(reply
            .html
            .contains("https://drive.google.com/file/d/obj0/view"));

        let uploads = b.dest.uploads();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].content, b"hello drive");
        assert_eq!(uploads[0].parent_id, FOLDER);
        assert!(b.staging_is_empty());
    }

    #[tokio::test]
    async fn revoked_credential_yields_generic_failure() {
        let b = bot(
            FakeSource::default().with_file("d", b"x"),
            FakeDestination {
                reject_auth: true,
                ..Default::default()
            },
        )
        .await;
        b.make_ready(1).await;
        let before = b.store.get(UserId(1)).await.unwrap();

        let reply = b
            .dispatcher
            .handle(file(1, RawContentKind::Video, "d", None))
            .await;
        assert_eq!(reply, Reply::from_error(&Error::Authentication(String::new())));
        assert_eq!(b.store.get(UserId(1)).await.unwrap(), before);
        assert!(b.staging_is_empty());
    }

    #[tokio::test]
    async fn unsupported_content_does_not_create_records() {
        let b = bot(FakeSource::default(), FakeDestination::default()).await;
        let reply = b
            .dispatcher
            .handle(file(1, RawContentKind::Other("sticker".to_string()), "s", None))
            .await;
        assert_eq!(reply, Reply::unsupported());
        assert!(b.store.get(UserId(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn credential_upload_while_awaiting_destination_is_rejected() {
        let other = service_account_json().replace(
            "relay@relay-test.iam.gserviceaccount.com",
            "other@relay-test.iam.gserviceaccount.com",
        );
        let b = bot(
            FakeSource::default().with_file("c", other.as_bytes()),
            FakeDestination::default(),
        )
        .await;
        b.store
            .upsert_credential(UserId(1), service_account())
            .await
            .unwrap();

        let reply = b
            .dispatcher
            .handle(file(1, RawContentKind::Document, "c", Some("other.json")))
            .await;
        assert_eq!(reply.kind, ReplyKind::Error);
        assert!(reply.html.contains("/setfolder"));

        let rec = b.store.get(UserId(1)).await.unwrap().unwrap();
        assert_eq!(rec.credential, Some(service_account()));
        assert_eq!(b.state(1).await, OnboardingState::AwaitingDestination);
    }

    #[tokio::test]
    async fn json_document_from_ready_user_replaces_credential() {
        let b = bot(
            FakeSource::default().with_file("c", service_account_json().as_bytes()),
            FakeDestination::default(),
        )
        .await;
        b.make_ready(1).await;

        let reply = b
            .dispatcher
            .handle(file(1, RawContentKind::Document, "c", Some("new.json")))
            .await;
        assert_eq!(reply.kind, ReplyKind::Success);
        assert_eq!(b.state(1).await, OnboardingState::Ready);
        assert!(b.dest.uploads().is_empty());
    }
}
