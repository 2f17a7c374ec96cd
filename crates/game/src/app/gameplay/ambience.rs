use engine::{AudioSource, EntityId, SceneWorld, Transform, Vec3};
use tracing::{debug, info};

use super::rng::SeededRng;
use crate::app::config::AmbienceConfig;

pub(crate) const AMBIENCE_TRACKS: [&str; 4] = [
    "sounds/ambience1.mp3",
    "sounds/ambience2.mp3",
    "sounds/ambience3.mp3",
    "sounds/ambience4.mp3",
];

/// Background tracks that outlive every stage. One random track plays at a
/// time; the session re-rolls after a random clip length plus gap.
#[derive(Debug, Clone)]
pub(crate) struct AmbienceLoop {
    rng: SeededRng,
    tracks: Vec<EntityId>,
    current: Option<usize>,
    plays: u32,
}

impl AmbienceLoop {
    pub(crate) fn new(seed: u64) -> Self {
        Self {
            rng: SeededRng::new(seed),
            tracks: Vec::new(),
            current: None,
            plays: 0,
        }
    }

    /// Spawns the track entities once. Later calls are no-ops.
    pub(crate) fn attach(&mut self, world: &mut SceneWorld, volume: f32) {
        if !self.tracks.is_empty() {
            return;
        }
        for clip in AMBIENCE_TRACKS {
            let id = world.spawn("ambience", Transform::at(Vec3::ZERO));
            if let Some(entity) = world.find_entity_mut(id) {
                entity.audio = Some(AudioSource::new(clip, false, volume));
            }
            self.tracks.push(id);
        }
        debug!(tracks = self.tracks.len(), "ambience_attached");
    }

    #[cfg(test)]
    pub(crate) fn entities(&self) -> &[EntityId] {
        &self.tracks
    }

    #[cfg(test)]
    pub(crate) fn current(&self) -> Option<usize> {
        self.current
    }

    #[cfg(test)]
    pub(crate) fn plays(&self) -> u32 {
        self.plays
    }

    /// Stops every track, starts a random one and returns the delay in
    /// seconds before the next re-roll.
    pub(crate) fn play_next(&mut self, world: &mut SceneWorld, config: &AmbienceConfig) -> f32 {
        self.stop(world);
        let clip_seconds = self.rng.range_f32(config.clip_min_seconds, config.clip_max_seconds);
        let gap_seconds = self.rng.range_f32(config.gap_min_seconds, config.gap_max_seconds);
        if self.tracks.is_empty() {
            return clip_seconds + gap_seconds;
        }

        let index = self.rng.below(self.tracks.len());
        match world.audio_mut(self.tracks[index]) {
            Ok(audio) => {
                audio.playing = true;
                self.current = Some(index);
                self.plays += 1;
                info!(
                    track = AMBIENCE_TRACKS.get(index).copied().unwrap_or("unknown"),
                    clip_seconds,
                    gap_seconds,
                    plays = self.plays,
                    "ambience_track_started"
                );
            }
            Err(err) => debug!(error = %err, "ambience_track_missing"),
        }
        clip_seconds + gap_seconds
    }

    pub(crate) fn stop(&mut self, world: &mut SceneWorld) {
        for &track in &self.tracks {
            if let Ok(audio) = world.audio_mut(track) {
                audio.playing = false;
            }
        }
        if let Some(index) = self.current.take() {
            debug!(track = AMBIENCE_TRACKS.get(index).copied().unwrap_or("unknown"), "ambience_track_stopped");
        }
    }
}
