use std::fmt;

/// Classifies the outcome of a single gateway, route, or backend decision made while converting
/// an ingress.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Event {
    #[default]
    Normal,
    EmptyRule,
    InvalidBackendService,
    PortNameResolveError,
    DuplicatedRoute,
    DuplicatedTls,
    Unknown,
}

// === impl Event ===

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::EmptyRule => "EmptyRule",
            Self::InvalidBackendService => "InvalidBackendService",
            Self::PortNameResolveError => "PortNameResolveError",
            Self::DuplicatedRoute => "DuplicatedRoute",
            Self::DuplicatedTls => "DuplicatedTls",
            Self::Unknown => "Unknown",
        }
    }

    #[inline]
    pub fn is_normal(&self) -> bool {
        matches!(self, Self::Normal)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
