//! Hand-written fakes for the ports, shared by the unit tests.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageId, MessageRef, User, UserId},
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{MessagingCapabilities, ReplyKeyboard},
    },
    providers::{CurrentlyPlaying, LyricsProvider, MusicProvider, Track},
    Result,
};

#[derive(Clone, Debug)]
pub struct SentMessage {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub html: String,
    pub keyboard: Option<ReplyKeyboard>,
}

/// Records sends/deletes; outbound ids start at 1001.
#[derive(Default)]
pub struct FakeMessenger {
    next_id: Mutex<i32>,
    sent: Mutex<Vec<SentMessage>>,
    delete_attempts: Mutex<Vec<i32>>,
    failing_deletes: Vec<i32>,
    failing_sends: Mutex<Vec<String>>,
}

impl FakeMessenger {
    pub fn failing_deletes(ids: &[i32]) -> Self {
        Self {
            failing_deletes: ids.to_vec(),
            ..Self::default()
        }
    }

    /// Fail every send whose HTML contains `needle`.
    pub fn fail_sends_containing(&self, needle: &str) {
        self.failing_sends.lock().unwrap().push(needle.to_string());
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sent().into_iter().map(|m| m.html).collect()
    }

    pub fn delete_attempts(&self) -> Vec<i32> {
        self.delete_attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessagingPort for FakeMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            max_message_len: 4096,
        }
    }

    async fn send_html(
        &self,
        chat_id: ChatId,
        html: &str,
        keyboard: Option<&ReplyKeyboard>,
    ) -> Result<MessageRef> {
        if self
            .failing_sends
            .lock()
            .unwrap()
            .iter()
            .any(|needle| html.contains(needle.as_str()))
        {
            return Err(Error::External("telegram error: send failed".to_string()));
        }

        let message_id = {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            MessageId(1000 + *next)
        };
        self.sent.lock().unwrap().push(SentMessage {
            chat_id,
            message_id,
            html: html.to_string(),
            keyboard: keyboard.cloned(),
        });
        Ok(MessageRef {
            chat_id,
            message_id,
        })
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.delete_attempts.lock().unwrap().push(msg.message_id.0);
        if self.failing_deletes.contains(&msg.message_id.0) {
            return Err(Error::External(
                "telegram error: message to delete not found".to_string(),
            ));
        }
        Ok(())
    }
}

pub struct FakeMusic {
    pub playing: Mutex<Result<CurrentlyPlaying>>,
    pub calls: Mutex<usize>,
}

impl FakeMusic {
    pub fn playing(name: &str, artists: &[&str]) -> Self {
        Self::with(Ok(CurrentlyPlaying::Track(Track {
            name: name.to_string(),
            artists: artists.iter().map(|a| a.to_string()).collect(),
        })))
    }

    pub fn nothing() -> Self {
        Self::with(Ok(CurrentlyPlaying::NothingPlaying))
    }

    pub fn unauthorized() -> Self {
        Self::with(Err(Error::Unauthorized))
    }

    fn with(result: Result<CurrentlyPlaying>) -> Self {
        Self {
            playing: Mutex::new(result),
            calls: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl MusicProvider for FakeMusic {
    fn authorization_link(&self, user_id: UserId) -> String {
        format!("https://music.example.com/authorize?state={user_id}")
    }

    async fn currently_playing(&self, _user: &User) -> Result<CurrentlyPlaying> {
        *self.calls.lock().unwrap() += 1;
        match &*self.playing.lock().unwrap() {
            Ok(v) => Ok(v.clone()),
            Err(Error::Unauthorized) => Err(Error::Unauthorized),
            Err(e) => Err(Error::External(e.to_string())),
        }
    }
}

pub enum FakeLyricsOutcome {
    Found(String),
    NotFound,
    FetchError,
}

pub struct FakeLyrics {
    pub outcome: FakeLyricsOutcome,
    pub queries: Mutex<Vec<(String, String)>>,
}

impl FakeLyrics {
    pub fn new(outcome: FakeLyricsOutcome) -> Self {
        Self {
            outcome,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<(String, String)> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl LyricsProvider for FakeLyrics {
    async fn lyrics(&self, song_name: &str, artists: &str) -> Result<Option<String>> {
        self.queries
            .lock()
            .unwrap()
            .push((song_name.to_string(), artists.to_string()));
        match &self.outcome {
            FakeLyricsOutcome::Found(text) => Ok(Some(text.clone())),
            FakeLyricsOutcome::NotFound => Ok(None),
            FakeLyricsOutcome::FetchError => {
                Err(Error::External("genius request error: timed out".to_string()))
            }
        }
    }
}
