//! Permission names
//!
//! Permissions are opaque capability strings. Groups grant them, may negate
//! them with a leading `!`, and `*` stands for every capability.

use crate::error::{Error, Result};

/// Grants every capability
pub const WILDCARD: &str = "*";

/// Prefix that marks a negated permission in user input
pub const NEGATION_PREFIX: char = '!';

// Session
pub const CAN_REGISTER: &str = "canregister";
pub const CAN_LOGIN: &str = "canlogin";
pub const CAN_LOGOUT: &str = "canlogout";
pub const CAN_CHANGE_PASSWORD: &str = "canchangepassword";
pub const CAN_CHAT: &str = "canchat";
pub const CAN_PARTY_CHAT: &str = "canpartychat";
pub const CAN_TALK_IN_THIRD: &str = "cantalkinthird";
pub const SEND_EMOJI: &str = "sendemoji";
pub const SYNC_LOCAL_AREA: &str = "synclocalarea";

// World
pub const CAN_BUILD: &str = "canbuild";
pub const CAN_PAINT: &str = "canpaint";
pub const WARP: &str = "warp";
pub const WHISPER: &str = "whisper";
pub const WORMHOLE: &str = "wormhole";
pub const SUMMON_BOSS: &str = "summonboss";
pub const PYLON: &str = "pylon";
pub const TP_POTION: &str = "tppotion";
pub const MAGIC_CONCH: &str = "magicconch";
pub const DEMON_CONCH: &str = "demonconch";

// Administration
pub const MANAGE_GROUP: &str = "managegroup";
pub const MANAGE_USER: &str = "manageusers";
pub const MANAGE_REGION: &str = "manageregion";
pub const EDIT_REGION: &str = "editregion";
pub const BAN: &str = "ban";
pub const MUTE: &str = "mute";
pub const CONFIG: &str = "config";

/// Grants seeded into the guest group on first run
pub fn guest_defaults() -> Vec<String> {
    [
        CAN_BUILD,
        CAN_REGISTER,
        CAN_LOGIN,
        CAN_PARTY_CHAT,
        CAN_TALK_IN_THIRD,
        CAN_CHAT,
        SYNC_LOCAL_AREA,
        SEND_EMOJI,
    ]
    .iter()
    .map(|p| p.to_string())
    .collect()
}

/// Grants seeded into the default registration group on first run
pub fn registered_defaults() -> Vec<String> {
    [
        WARP,
        CAN_CHANGE_PASSWORD,
        CAN_LOGOUT,
        SUMMON_BOSS,
        WHISPER,
        WORMHOLE,
        CAN_PAINT,
        PYLON,
        TP_POTION,
        MAGIC_CONCH,
        DEMON_CONCH,
    ]
    .iter()
    .map(|p| p.to_string())
    .collect()
}

/// Split user input into (name, negated)
///
/// Rejects empty names and names containing whitespace.
pub fn parse_permission(raw: &str) -> Result<(String, bool)> {
    let (name, negated) = match raw.strip_prefix(NEGATION_PREFIX) {
        Some(rest) => (rest, true),
        None => (raw, false),
    };

    if name.is_empty() || name.chars().any(char::is_whitespace) {
        return Err(Error::invalid(format!("Invalid permission: \"{}\"", raw)));
    }

    Ok((name.to_string(), negated))
}
