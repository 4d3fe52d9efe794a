//! Per-fiber status transitions and the commands that drive them.
//!
//! Clicks, keyboard shortcuts, and voice commands all end up as a
//! [`FiberCommand`] fed through [`apply_command`].

use serde::{Deserialize, Serialize};

use crate::models::FiberStatus;

impl FiberStatus {
    /// Click cycle: not-configured -> available -> occupied -> not-configured.
    pub fn advance(self) -> FiberStatus {
        match self {
            FiberStatus::NotConfigured => FiberStatus::Available,
            FiberStatus::Available => FiberStatus::Occupied,
            FiberStatus::Occupied => FiberStatus::NotConfigured,
        }
    }

    pub fn is_configured(self) -> bool {
        self != FiberStatus::NotConfigured
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FiberStatus::NotConfigured => "not-configured",
            FiberStatus::Available => "available",
            FiberStatus::Occupied => "occupied",
        }
    }

    /// Label shown to field technicians.
    pub fn label(self) -> &'static str {
        match self {
            FiberStatus::NotConfigured => "A Configurer",
            FiberStatus::Available => "Libre",
            FiberStatus::Occupied => "Occupée",
        }
    }
}

impl std::fmt::Display for FiberStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FiberCommand {
    SetAvailable,
    SetOccupied,
    Advance,
    CancelListening,
}

impl FiberCommand {
    /// Commands that record a status and then move to the next port.
    pub fn moves_next(self) -> bool {
        matches!(self, FiberCommand::SetAvailable | FiberCommand::SetOccupied)
    }
}

/// Next status of one fiber under `command`. `CancelListening` leaves it as is.
pub fn apply_command(status: FiberStatus, command: FiberCommand) -> FiberStatus {
    match command {
        FiberCommand::SetAvailable => FiberStatus::Available,
        FiberCommand::SetOccupied => FiberStatus::Occupied,
        FiberCommand::Advance => status.advance(),
        FiberCommand::CancelListening => status,
    }
}

fn fold_accents(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'à' | 'â' => 'a',
            'î' | 'ï' => 'i',
            'ô' => 'o',
            'ù' | 'û' => 'u',
            'ç' => 'c',
            other => other,
        })
        .collect()
}

/// Map a speech transcript to a command. The first recognised keyword wins.
pub fn parse_voice_command(transcript: &str) -> Option<FiberCommand> {
    let folded = fold_accents(&transcript.to_lowercase());
    folded
        .split(|c: char| !c.is_alphanumeric())
        .find_map(|word| match word {
            "disponible" | "libre" => Some(FiberCommand::SetAvailable),
            "occupe" | "occupee" => Some(FiberCommand::SetOccupied),
            "stop" | "arrete" | "arreter" => Some(FiberCommand::CancelListening),
            _ => None,
        })
}

/// Map a key name (DOM `KeyboardEvent.key` style) to a command.
///
/// Space toggles between available and occupied; a not-configured port
/// becomes available.
pub fn key_command(key: &str, current: FiberStatus) -> Option<FiberCommand> {
    match key {
        "Escape" | "Esc" => Some(FiberCommand::CancelListening),
        " " | "Space" | "Spacebar" => Some(if current == FiberStatus::Available {
            FiberCommand::SetOccupied
        } else {
            FiberCommand::SetAvailable
        }),
        "Enter" => Some(FiberCommand::Advance),
        _ => None,
    }
}
