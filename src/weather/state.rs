use thiserror::Error;

/// Why a resolution produced no data. Never an exception: callers receive it as a value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NoDataReason {
    #[error("remote weather request failed: {0}")]
    Remote(String),
    #[error("remote weather source returned no data")]
    RemoteEmpty,
    #[error("local store unavailable: {0}")]
    Storage(String),
    #[error("no cached weather for this location")]
    NoCachedMatch,
}

/// Where a resolved value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataOrigin {
    Remote,
    Favorite { city_name: String },
    Home { city_name: String },
}

impl DataOrigin {
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Remote)
    }
}

impl std::fmt::Display for DataOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Remote => write!(f, "live"),
            Self::Favorite { city_name } => write!(f, "favorite '{city_name}'"),
            Self::Home { city_name } => write!(f, "home snapshot '{city_name}'"),
        }
    }
}

/// Outcome of a single resolution call.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved<T> {
    Found { value: T, origin: DataOrigin },
    NoData(NoDataReason),
}

impl<T> Resolved<T> {
    pub fn live(value: T) -> Self {
        Self::Found {
            value,
            origin: DataOrigin::Remote,
        }
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Found { value, .. } => Some(value),
            Self::NoData(_) => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Found { value, .. } => Some(value),
            Self::NoData(_) => None,
        }
    }

    pub fn origin(&self) -> Option<&DataOrigin> {
        match self {
            Self::Found { origin, .. } => Some(origin),
            Self::NoData(_) => None,
        }
    }

    pub fn is_live(&self) -> bool {
        self.origin().is_some_and(DataOrigin::is_live)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Resolved<U> {
        match self {
            Self::Found { value, origin } => Resolved::Found {
                value: f(value),
                origin,
            },
            Self::NoData(reason) => Resolved::NoData(reason),
        }
    }
}

/// Three-state value a UI observes. Consumers always react to the latest one.
#[derive(Debug, Clone, PartialEq)]
pub enum WeatherState<T> {
    Loading,
    Success(T),
    Failure(NoDataReason),
}

impl<T> From<Resolved<T>> for WeatherState<T> {
    fn from(resolved: Resolved<T>) -> Self {
        match resolved {
            Resolved::Found { value, .. } => Self::Success(value),
            Resolved::NoData(reason) => Self::Failure(reason),
        }
    }
}

impl<T> WeatherState<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    pub fn success(&self) -> Option<&T> {
        match self {
            Self::Success(value) => Some(value),
            _ => None,
        }
    }
}
