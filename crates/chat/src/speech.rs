use std::collections::HashMap;
use std::sync::Arc;

use snafu::ResultExt;
use tracing::debug;

use artalk_backend::SpeechSynthesizer;
use artalk_storage::MessageId;

use crate::error::{ChatResult, SpeechSnafu};

/// Seam over the host's audio device. The controller never touches audio
/// hardware directly.
pub trait AudioPlayer: Send {
    fn play(&mut self, audio: &[u8]);
    fn pause(&mut self);
    fn resume(&mut self);
    fn is_playing(&self) -> bool;
    fn release(&mut self);
}

/// Drives read-aloud playback for answer messages, synthesizing each
/// message's audio at most once.
pub struct SpeechController {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    player: Box<dyn AudioPlayer>,
    cache: HashMap<MessageId, Vec<u8>>,
    active: Option<MessageId>,
    paused: bool,
}

impl SpeechController {
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>, player: Box<dyn AudioPlayer>) -> Self {
        Self {
            synthesizer,
            player,
            cache: HashMap::new(),
            active: None,
            paused: false,
        }
    }

    /// One button, four outcomes: pause if playing, resume if this message is
    /// paused, replay from cache, or synthesize then play.
    pub async fn toggle_playback(
        &mut self,
        api_key: &str,
        voice_id: &str,
        message_id: MessageId,
        text: &str,
    ) -> ChatResult<()> {
        if self.player.is_playing() {
            self.player.pause();
            self.paused = true;
            return Ok(());
        }

        if self.paused && self.active == Some(message_id) {
            self.player.resume();
            self.paused = false;
            return Ok(());
        }

        let audio = match self.cache.get(&message_id) {
            Some(cached) => cached.clone(),
            None => {
                let synthesized = self
                    .synthesizer
                    .synthesize(api_key, voice_id, text)
                    .await
                    .context(SpeechSnafu { stage: "synthesize" })?;
                debug!(message = %message_id, bytes = synthesized.len(), "synthesized speech");
                self.cache.insert(message_id, synthesized.clone());
                synthesized
            }
        };

        self.player.play(&audio);
        self.active = Some(message_id);
        self.paused = false;
        Ok(())
    }

    /// Drops player state and the audio cache.
    pub fn release(&mut self) {
        self.player.release();
        self.cache.clear();
        self.active = None;
        self.paused = false;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use artalk_backend::BackendResult;

    use super::*;

    #[derive(Default)]
    struct FakePlayer {
        playing: bool,
        log: Vec<String>,
    }

    struct SharedPlayer(Arc<Mutex<FakePlayer>>);

    impl AudioPlayer for SharedPlayer {
        fn play(&mut self, audio: &[u8]) {
            let mut inner = self.0.lock().unwrap();
            inner.playing = true;
            inner.log.push(format!("play:{}", audio.len()));
        }

        fn pause(&mut self) {
            let mut inner = self.0.lock().unwrap();
            inner.playing = false;
            inner.log.push("pause".to_string());
        }

        fn resume(&mut self) {
            let mut inner = self.0.lock().unwrap();
            inner.playing = true;
            inner.log.push("resume".to_string());
        }

        fn is_playing(&self) -> bool {
            self.0.lock().unwrap().playing
        }

        fn release(&mut self) {
            let mut inner = self.0.lock().unwrap();
            inner.playing = false;
            inner.log.push("release".to_string());
        }
    }

    struct CountingSynthesizer {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SpeechSynthesizer for CountingSynthesizer {
        async fn synthesize(
            &self,
            _api_key: &str,
            _voice_id: &str,
            text: &str,
        ) -> BackendResult<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(text.as_bytes().to_vec())
        }
    }

    fn controller() -> (SpeechController, Arc<Mutex<FakePlayer>>, Arc<CountingSynthesizer>) {
        let player = Arc::new(Mutex::new(FakePlayer::default()));
        let synthesizer = Arc::new(CountingSynthesizer {
            calls: AtomicUsize::new(0),
        });
        let controller = SpeechController::new(
            synthesizer.clone(),
            Box::new(SharedPlayer(player.clone())),
        );
        (controller, player, synthesizer)
    }

    #[tokio::test]
    async fn first_toggle_synthesizes_and_plays() {
        let (mut controller, player, synthesizer) = controller();
        let id = MessageId::new(1);

        controller
            .toggle_playback("key", "voice", id, "bonjour")
            .await
            .expect("toggle");

        assert_eq!(synthesizer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(player.lock().unwrap().log, vec!["play:7"]);
    }

    #[tokio::test]
    async fn toggle_while_playing_pauses_and_toggle_again_resumes() {
        let (mut controller, player, synthesizer) = controller();
        let id = MessageId::new(1);

        controller
            .toggle_playback("key", "voice", id, "bonjour")
            .await
            .expect("play");
        controller
            .toggle_playback("key", "voice", id, "bonjour")
            .await
            .expect("pause");
        controller
            .toggle_playback("key", "voice", id, "bonjour")
            .await
            .expect("resume");

        assert_eq!(synthesizer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            player.lock().unwrap().log,
            vec!["play:7", "pause", "resume"]
        );
    }

    #[tokio::test]
    async fn replaying_a_finished_message_uses_the_cache() {
        let (mut controller, player, synthesizer) = controller();
        let id = MessageId::new(1);

        controller
            .toggle_playback("key", "voice", id, "bonjour")
            .await
            .expect("play");
        // Playback ran to completion on the device side.
        player.lock().unwrap().playing = false;
        controller
            .toggle_playback("key", "voice", id, "bonjour")
            .await
            .expect("replay");

        assert_eq!(synthesizer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(player.lock().unwrap().log, vec!["play:7", "play:7"]);
    }

    #[tokio::test]
    async fn release_clears_the_cache() {
        let (mut controller, player, synthesizer) = controller();
        let id = MessageId::new(1);

        controller
            .toggle_playback("key", "voice", id, "bonjour")
            .await
            .expect("play");
        controller.release();
        controller
            .toggle_playback("key", "voice", id, "bonjour")
            .await
            .expect("play again");

        assert_eq!(synthesizer.calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            player.lock().unwrap().log,
            vec!["play:7", "release", "play:7"]
        );
    }
}
