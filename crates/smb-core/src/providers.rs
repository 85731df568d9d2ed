//! Ports for the music and lyrics providers.

use async_trait::async_trait;

use crate::{
    domain::{User, UserId},
    Result,
};

/// A track reported by the music provider as currently playing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Track {
    pub name: String,
    /// Artist names in the provider's order.
    pub artists: Vec<String>,
}

impl Track {
    /// Artist names joined with `", "`.
    pub fn joined_artists(&self) -> String {
        self.artists.join(", ")
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CurrentlyPlaying {
    Track(Track),
    NothingPlaying,
}

/// Music streaming provider (authorization + "now playing").
#[async_trait]
pub trait MusicProvider: Send + Sync {
    /// Link the user follows to grant access; `user_id` travels back as OAuth state.
    fn authorization_link(&self, user_id: UserId) -> String;

    /// Fails with [`crate::Error::Unauthorized`] when the user has no credentials.
    async fn currently_playing(&self, user: &User) -> Result<CurrentlyPlaying>;
}

/// Lyrics lookup service.
#[async_trait]
pub trait LyricsProvider: Send + Sync {
    /// `Ok(None)` when no lyrics exist for the song; `Err` on fetch failure.
    async fn lyrics(&self, song_name: &str, artists: &str) -> Result<Option<String>>;
}
