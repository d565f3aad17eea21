/// The revision of the Olm and Megolm message formats a session speaks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ProtocolVersion {
    /// Messages carry an 8 byte truncated MAC (message version byte 3).
    #[default]
    V1,
    /// Messages carry the full 32 byte MAC (message version byte 4).
    V2,
}

/// Per-session settings, chosen when a session is created and kept in its pickle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SessionConfig {
    /// The message format revision.
    pub version: ProtocolVersion,
}

impl SessionConfig {
    /// A configuration producing messages libolm can read.
    pub fn version_1() -> Self {
        Self {
            version: ProtocolVersion::V1,
        }
    }

    /// A configuration producing messages with untruncated MACs.
    pub fn version_2() -> Self {
        Self {
            version: ProtocolVersion::V2,
        }
    }

    /// The numeric version, as stored in pickles.
    pub fn version_number(&self) -> u8 {
        match self.version {
            ProtocolVersion::V1 => 1,
            ProtocolVersion::V2 => 2,
        }
    }

    pub(crate) fn from_version_number(version: u32) -> Option<Self> {
        match version {
            1 => Some(Self::version_1()),
            2 => Some(Self::version_2()),
            _ => None,
        }
    }

    pub(crate) fn message_version(&self) -> u8 {
        match self.version {
            ProtocolVersion::V1 => 3,
            ProtocolVersion::V2 => 4,
        }
    }

    pub(crate) fn from_message_version(version: u8) -> Option<Self> {
        match version {
            3 => Some(Self::version_1()),
            4 => Some(Self::version_2()),
            _ => None,
        }
    }

    pub(crate) fn mac_length(&self) -> usize {
        match self.version {
            ProtocolVersion::V1 => 8,
            ProtocolVersion::V2 => 32,
        }
    }
}

/// What an account does when a one-time key request exceeds its limits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Clamp the request and evict the oldest keys beyond capacity.
    #[default]
    DiscardOldest,
    /// Refuse the request without touching the pool.
    Reject,
}

/// Limits applied to an account's one-time key pool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountConfig {
    /// Reported pool size, and the most keys a single request will create.
    pub max_one_time_keys: usize,
    /// How many one-time key pairs the account retains in total.
    pub one_time_key_capacity: usize,
    /// Behaviour when a request exceeds either limit.
    pub overflow_policy: OverflowPolicy,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            max_one_time_keys: 50,
            one_time_key_capacity: 5000,
            overflow_policy: OverflowPolicy::DiscardOldest,
        }
    }
}
