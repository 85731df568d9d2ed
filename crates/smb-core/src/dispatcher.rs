use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::{
    clearing::MessageClearer,
    commands::{Command, Input},
    domain::{ChatId, MessageId, MessengerPlatform, MusicProviderPlatform, User, UserIdentity},
    locks::UserLocks,
    messaging::port::MessagingPort,
    providers::{CurrentlyPlaying, LyricsProvider, MusicProvider},
    replies::{settings_keyboard, ReplyComposer},
    store::UserStore,
    users::UserService,
    Result,
};

pub const NO_TEXT_REPLY: &str = "Error: no text input";
pub const UNPROCESSABLE_REPLY: &str = "Unprocessable input";
pub const NOTHING_PLAYING_REPLY: &str = "No song is currently playing";
pub const NO_LYRICS_REPLY: &str = "No lyrics found for this song";
pub const LYRICS_FETCH_ERROR_REPLY: &str = "Error occured while trying to find lyrics";
pub const OPEN_SETTINGS_REPLY: &str = "Please configure the settings now";
pub const CLOSE_SETTINGS_REPLY: &str = "Settings closed";
pub const UNEXPECTED_ERROR_REPLY: &str = "An unexpected error occured. Please try again. In case the error keeps persisting, try following the authorization process again: /start";

/// One inbound chat event, already authenticated by the transport.
#[derive(Clone, Debug)]
pub struct InboundMessage {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub text: Option<String>,
}

/// Entry point the inbound transport hands authenticated events to.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    async fn handle(&self, msg: InboundMessage);
}

/// Collaborators the dispatcher drives.
pub struct DispatcherDeps {
    pub store: Arc<dyn UserStore>,
    pub messenger: Arc<dyn MessagingPort>,
    pub music: Arc<dyn MusicProvider>,
    pub lyrics: Arc<dyn LyricsProvider>,
    /// Shared with every other writer of user records.
    pub locks: Arc<UserLocks>,
    /// Maximum bytes per outbound message.
    pub safe_limit: usize,
}

/// Interprets inbound chat events and runs the matching command.
///
/// [`Dispatcher::handle`] never fails: handler errors become a user-visible
/// apology and a failing apology is only logged.
pub struct Dispatcher {
    platform: MessengerPlatform,
    provider: MusicProviderPlatform,
    users: Arc<UserService>,
    clearer: Arc<MessageClearer>,
    replies: ReplyComposer,
    music: Arc<dyn MusicProvider>,
    lyrics: Arc<dyn LyricsProvider>,
    locks: Arc<UserLocks>,
}

impl Dispatcher {
    pub fn new(deps: DispatcherDeps) -> Self {
        let users = Arc::new(UserService::new(deps.store));
        let clearer = Arc::new(MessageClearer::new(users.clone(), deps.messenger.clone()));
        let replies = ReplyComposer::new(deps.messenger, clearer.clone(), deps.safe_limit);
        Self {
            platform: MessengerPlatform::Telegram,
            provider: MusicProviderPlatform::Spotify,
            users,
            clearer,
            replies,
            music: deps.music,
            lyrics: deps.lyrics,
            locks: deps.locks,
        }
    }

    pub async fn handle(&self, msg: InboundMessage) {
        let identity = UserIdentity {
            messenger_platform: self.platform,
            messenger_user_id: msg.chat_id.0.to_string(),
            music_provider_platform: self.provider,
        };
        let _guard = self.locks.lock_user(&identity).await;

        info!(platform = %self.platform, chat_id = msg.chat_id.0, "message received");
        debug!(
            platform = %self.platform,
            chat_id = msg.chat_id.0,
            message_id = msg.message_id.0,
            "message details"
        );

        let mut user = match self.users.get_or_create(&identity).await {
            Ok(user) => user,
            Err(e) => {
                error!(
                    platform = %self.platform,
                    chat_id = msg.chat_id.0,
                    error = %e,
                    "failed to load user, dropping event"
                );
                return;
            }
        };

        if let Err(e) = self.process(&mut user, &msg).await {
            error!(
                platform = %self.platform,
                chat_id = msg.chat_id.0,
                text = msg.text.as_deref().unwrap_or_default(),
                error = %e,
                "error while handling message"
            );
            if let Err(e2) = self
                .replies
                .send(msg.chat_id, &mut user, UNEXPECTED_ERROR_REPLY, None)
                .await
            {
                error!(
                    platform = %self.platform,
                    chat_id = msg.chat_id.0,
                    error = %e2,
                    "failed to send error reply"
                );
            }
        }
    }

    async fn process(&self, user: &mut User, msg: &InboundMessage) -> Result<()> {
        // The inbound message itself is eligible for clearing, whatever it says.
        self.clearer.append(user, msg.message_id).await?;

        let chat_id = msg.chat_id;
        match Input::classify(msg.text.as_deref()) {
            Input::Empty => {
                self.replies.send_plain(chat_id, user, NO_TEXT_REPLY, None).await?;
            }
            Input::Unprocessable => {
                self.replies
                    .send_plain(chat_id, user, UNPROCESSABLE_REPLY, None)
                    .await?;
            }
            Input::Command(cmd) => self.run(cmd, user, msg).await?,
        }
        Ok(())
    }

    async fn run(&self, cmd: Command, user: &mut User, msg: &InboundMessage) -> Result<()> {
        let chat_id = msg.chat_id;
        debug!(chat_id = chat_id.0, command = ?cmd, "dispatching command");

        match cmd {
            Command::Authorize => self.send_authorization_link(chat_id, user).await,
            Command::Lyrics => {
                if user.autoclear {
                    let report = self
                        .clearer
                        .clear(user, chat_id, Some(msg.message_id))
                        .await?;
                    info!(
                        chat_id = chat_id.0,
                        attempted = report.attempted,
                        deleted = report.deleted,
                        "autoclear before lyrics"
                    );
                }
                self.send_lyrics(chat_id, user).await
            }
            Command::Clear => {
                let report = self.clearer.clear(user, chat_id, None).await?;
                info!(
                    chat_id = chat_id.0,
                    attempted = report.attempted,
                    deleted = report.deleted,
                    "chat cleared"
                );
                Ok(())
            }
            Command::OpenSettings => {
                let keyboard = settings_keyboard(user.autoclear);
                self.replies
                    .send_plain(chat_id, user, OPEN_SETTINGS_REPLY, Some(&keyboard))
                    .await?;
                Ok(())
            }
            Command::CloseSettings => {
                self.replies
                    .send_plain(chat_id, user, CLOSE_SETTINGS_REPLY, None)
                    .await?;
                Ok(())
            }
            Command::ToggleAutoclear => {
                let enabled = self.users.toggle_autoclear(user).await?;
                let text = format!("Autoclear is turned {}", if enabled { "on" } else { "off" });
                let keyboard = settings_keyboard(enabled);
                self.replies
                    .send_plain(chat_id, user, &text, Some(&keyboard))
                    .await?;
                Ok(())
            }
        }
    }

    async fn send_authorization_link(&self, chat_id: ChatId, user: &mut User) -> Result<()> {
        let link = self.music.authorization_link(user.id);
        let text = format!(
            "Please follow the [link]({link}) to authorize Spotify\n\n\
             After you authorize Spotify, just send /lyrics command or type in \"Lyrics\" to get them"
        );
        self.replies.send(chat_id, user, &text, None).await?;
        Ok(())
    }

    async fn send_lyrics(&self, chat_id: ChatId, user: &mut User) -> Result<()> {
        let track = match self.music.currently_playing(user).await? {
            CurrentlyPlaying::Track(track) => track,
            CurrentlyPlaying::NothingPlaying => {
                self.replies
                    .send_plain(chat_id, user, NOTHING_PLAYING_REPLY, None)
                    .await?;
                return Ok(());
            }
        };

        let artists = track.joined_artists();
        let label = if track.artists.len() > 1 {
            "Artists"
        } else {
            "Artist"
        };
        let song_info = format!("Song: {}\n{label}: {artists}", track.name);
        self.replies.send_plain(chat_id, user, &song_info, None).await?;

        match self.lyrics.lyrics(&track.name, &artists).await {
            Ok(Some(text)) if !text.trim().is_empty() => {
                self.replies.send_plain(chat_id, user, &text, None).await?;
            }
            Ok(_) => {
                debug!(platform = %self.platform, chat_id = chat_id.0, "no lyrics found");
                self.replies
                    .send_plain(chat_id, user, NO_LYRICS_REPLY, None)
                    .await?;
            }
            Err(e) => {
                error!(
                    platform = %self.platform,
                    chat_id = chat_id.0,
                    error = %e,
                    "error fetching lyrics"
                );
                self.replies
                    .send_plain(chat_id, user, LYRICS_FETCH_ERROR_REPLY, None)
                    .await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl InboundHandler for Dispatcher {
    async fn handle(&self, msg: InboundMessage) {
        Dispatcher::handle(self, msg).await
    }
}
