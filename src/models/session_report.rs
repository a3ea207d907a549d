use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;
use uuid::Uuid;

/// The nine violation counters a detection client may report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    HeadTurn,
    HeadTilt,
    LookAway,
    FaceVisibility,
    MultiplePeople,
    MobileDetected,
    AudioIncident,
    TabSwitch,
    WindowSwitch,
}

impl ViolationKind {
    pub fn column(self) -> &'static str {
        match self {
            ViolationKind::HeadTurn => "heads_turned",
            ViolationKind::HeadTilt => "head_tilts",
            ViolationKind::LookAway => "look_aways",
            ViolationKind::FaceVisibility => "face_visibility_issues",
            ViolationKind::MultiplePeople => "multiple_people",
            ViolationKind::MobileDetected => "mobile_detected",
            ViolationKind::AudioIncident => "audio_incidents",
            ViolationKind::TabSwitch => "tab_switches",
            ViolationKind::WindowSwitch => "window_switches",
        }
    }
}

impl FromStr for ViolationKind {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "head_turn" => Ok(ViolationKind::HeadTurn),
            "head_tilt" => Ok(ViolationKind::HeadTilt),
            "look_away" => Ok(ViolationKind::LookAway),
            "face_visibility" => Ok(ViolationKind::FaceVisibility),
            "multiple_people" => Ok(ViolationKind::MultiplePeople),
            "mobile_detected" => Ok(ViolationKind::MobileDetected),
            "audio_incident" => Ok(ViolationKind::AudioIncident),
            "tab_switch" => Ok(ViolationKind::TabSwitch),
            "window_switch" => Ok(ViolationKind::WindowSwitch),
            _ => Err(()),
        }
    }
}

/// Aggregated proctoring counters for one attempt. Counters only grow;
/// the row freezes once `finalized` is set.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SessionReport {
    pub attempt_id: Uuid,
    pub heads_turned: i32,
    pub head_tilts: i32,
    pub look_aways: i32,
    pub face_visibility_issues: i32,
    pub multiple_people: i32,
    pub mobile_detected: i32,
    pub audio_incidents: i32,
    pub tab_switches: i32,
    pub window_switches: i32,
    pub finalized: bool,
    pub is_valid: Option<bool>,
    pub invalid_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finalized_at: Option<DateTime<Utc>>,
}

impl SessionReport {
    /// Zeroed, unfinalized view used when a proctored session has not
    /// produced any event yet.
    pub fn empty(attempt_id: Uuid, created_at: DateTime<Utc>) -> Self {
        Self {
            attempt_id,
            heads_turned: 0,
            head_tilts: 0,
            look_aways: 0,
            face_visibility_issues: 0,
            multiple_people: 0,
            mobile_detected: 0,
            audio_incidents: 0,
            tab_switches: 0,
            window_switches: 0,
            finalized: false,
            is_valid: None,
            invalid_reason: None,
            created_at,
            finalized_at: None,
        }
    }
}
