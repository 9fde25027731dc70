//! **Agent playback**: the avatar's mouth.
//!
//! `play` resolves once the clip is *accepted* for playback, not when it has
//! finished sounding. `interrupt` is the only way to preempt audio that is
//! already playing, and must resolve before the next `play` is issued.

use crate::error::ConversationResult;
use crate::tts::AudioClip;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::{debug, info};

/// Plays synthesized audio through the avatar and supports interruption.
#[async_trait]
pub trait AgentPlayback: Send + Sync {
    /// Queue `clip`; resolves when accepted.
    async fn play(&self, clip: AudioClip) -> ConversationResult<()>;

    /// Stop whatever is playing; resolves when stopped.
    async fn interrupt(&self) -> ConversationResult<()>;
}

/// Playback that accepts and discards clips. Tracks whether something would be
/// audible so the kill-switch can be exercised without an avatar.
#[derive(Debug, Default)]
pub struct NullPlayback {
    playing: AtomicBool,
    clips: AtomicUsize,
}

impl NullPlayback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    /// Number of clips accepted so far.
    pub fn clips_played(&self) -> usize {
        self.clips.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgentPlayback for NullPlayback {
    async fn play(&self, clip: AudioClip) -> ConversationResult<()> {
        self.clips.fetch_add(1, Ordering::SeqCst);
        if !clip.is_empty() {
            self.playing.store(true, Ordering::SeqCst);
        }
        debug!("NullPlayback: accepted {} bytes", clip.bytes.len());
        Ok(())
    }

    async fn interrupt(&self) -> ConversationResult<()> {
        if self.playing.swap(false, Ordering::SeqCst) {
            info!("NullPlayback: stopped (interruption)");
        }
        Ok(())
    }
}
