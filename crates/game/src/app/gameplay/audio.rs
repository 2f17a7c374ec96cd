use engine::{AudioSource, EntityId, SceneWorld, Transform, Vec3};
use tracing::{debug, warn};

use crate::app::validation::{validate_audio, ValidationReport};

/// Global looping tracks. They are created once per session and toggled by
/// each stage as it is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Sound {
    Heart,
    Wind,
    Whisper,
    Creaky,
    Dungeon,
    Angry,
    Final,
}

impl Sound {
    pub(crate) const ALL: [Sound; 7] = [
        Sound::Heart,
        Sound::Wind,
        Sound::Whisper,
        Sound::Creaky,
        Sound::Dungeon,
        Sound::Angry,
        Sound::Final,
    ];

    pub(crate) const fn clip(self) -> &'static str {
        match self {
            Sound::Heart => "sounds/heart.mp3",
            Sound::Wind => "sounds/wind.mp3",
            Sound::Whisper => "sounds/whisper.mp3",
            Sound::Creaky => "sounds/creaky.mp3",
            Sound::Dungeon => "sounds/dungeon.mp3",
            Sound::Angry => "sounds/angry.mp3",
            Sound::Final => "sounds/final.mp3",
        }
    }

    const fn volume(self) -> f32 {
        match self {
            Sound::Angry => 1.0,
            _ => 0.8,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct SoundBank {
    tracks: Vec<(Sound, EntityId)>,
}

impl SoundBank {
    /// Spawns one stopped looping source per sound. Sources that fail
    /// validation are still created; the report lists what was wrong.
    pub(crate) fn attach(&mut self, world: &mut SceneWorld) -> ValidationReport {
        let mut report = ValidationReport::default();
        if !self.tracks.is_empty() {
            return report;
        }
        for sound in Sound::ALL {
            let source = AudioSource::new(sound.clip(), true, sound.volume());
            let checked = validate_audio(&source);
            if !checked.is_valid() {
                warn!(clip = sound.clip(), errors = ?checked.errors, "sound_invalid");
            }
            report.errors.extend(checked.errors);
            report.warnings.extend(checked.warnings);

            let id = world.spawn("sound", Transform::at(Vec3::ZERO));
            if let Some(entity) = world.find_entity_mut(id) {
                entity.audio = Some(source);
            }
            self.tracks.push((sound, id));
        }
        report
    }

    pub(crate) fn entity(&self, sound: Sound) -> Option<EntityId> {
        self.tracks
            .iter()
            .find(|(candidate, _)| *candidate == sound)
            .map(|(_, id)| *id)
    }

    #[cfg(test)]
    pub(crate) fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.tracks.iter().map(|(_, id)| *id)
    }

    pub(crate) fn set(&self, world: &mut SceneWorld, sound: Sound, playing: bool) {
        let Some(id) = self.entity(sound) else {
            debug!(clip = sound.clip(), "sound_not_attached");
            return;
        };
        match world.audio_mut(id) {
            Ok(audio) => audio.playing = playing,
            Err(err) => debug!(clip = sound.clip(), error = %err, "sound_missing"),
        }
    }

    pub(crate) fn apply(&self, world: &mut SceneWorld, changes: &[(Sound, bool)]) {
        for &(sound, playing) in changes {
            self.set(world, sound, playing);
        }
    }

    pub(crate) fn stop_all(&self, world: &mut SceneWorld) {
        for sound in Sound::ALL {
            self.set(world, sound, false);
        }
    }

    #[cfg(test)]
    pub(crate) fn is_playing(&self, world: &SceneWorld, sound: Sound) -> bool {
        self.entity(sound)
            .and_then(|id| world.find_entity(id))
            .and_then(|entity| entity.audio.as_ref())
            .is_some_and(|audio| audio.playing)
    }
}
