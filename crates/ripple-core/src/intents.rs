//! Gateway intents
//!
//! Capability flags sent with Identify. Each bit opts the session into a
//! family of dispatch events.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

bitflags::bitflags! {
    /// Capability flags carried in the Identify handshake
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Intents: u64 {
        const GUILDS = 1 << 0;
        const GUILD_MEMBERS = 1 << 1;
        const GUILD_BANS = 1 << 2;
        const GUILD_EMOJIS_AND_STICKERS = 1 << 3;
        const GUILD_INTEGRATIONS = 1 << 4;
        const GUILD_WEBHOOKS = 1 << 5;
        const GUILD_INVITES = 1 << 6;
        const GUILD_VOICE_STATES = 1 << 7;
        const GUILD_PRESENCES = 1 << 8;
        const GUILD_MESSAGES = 1 << 9;
        const GUILD_MESSAGE_REACTIONS = 1 << 10;
        const GUILD_MESSAGE_TYPING = 1 << 11;
        const DIRECT_MESSAGES = 1 << 12;
        const DIRECT_MESSAGE_REACTIONS = 1 << 13;
        const DIRECT_MESSAGE_TYPING = 1 << 14;
        const GUILD_SCHEDULED_EVENTS = 1 << 16;
    }
}

impl Intents {
    /// The privileged intents, which require explicit enablement
    #[must_use]
    pub const fn privileged() -> Self {
        Self::GUILD_MEMBERS.union(Self::GUILD_PRESENCES)
    }

    /// Every non-privileged intent
    #[must_use]
    pub fn unprivileged() -> Self {
        Self::all().difference(Self::privileged())
    }
}

impl Default for Intents {
    /// Defaults to every non-privileged intent
    fn default() -> Self {
        Self::unprivileged()
    }
}

impl Serialize for Intents {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(self.bits())
    }
}

impl<'de> Deserialize<'de> for Intents {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = u64::deserialize(deserializer)?;
        Ok(Self::from_bits_truncate(bits))
    }
}
