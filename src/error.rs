use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PredivizError>;

#[derive(Debug, Error)]
pub enum PredivizError {
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),
    #[error("asset error: {0}")]
    Asset(#[from] AssetError),
    #[error("geometry contradiction: {0}")]
    Geometry(#[from] GeometryError),
    #[error("episode `{episode_id}`")]
    Episode {
        episode_id: String,
        #[source]
        source: Box<PredivizError>,
    },
}

impl PredivizError {
    /// Tags the error with the episode it came from. Already tagged errors
    /// keep their original id.
    pub fn in_episode(self, episode_id: &str) -> Self {
        match self {
            tagged @ Self::Episode { .. } => tagged,
            other => Self::Episode {
                episode_id: episode_id.to_string(),
                source: Box::new(other),
            },
        }
    }

    pub fn episode_id(&self) -> Option<&str> {
        match self {
            Self::Episode { episode_id, .. } => Some(episode_id),
            _ => None,
        }
    }

    /// The underlying schema, asset or geometry error.
    pub fn kind(&self) -> &PredivizError {
        match self {
            Self::Episode { source, .. } => source.kind(),
            other => other,
        }
    }
}

/// Input records the layout engine does not understand. Never retried.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("unsupported proposition kind `{0}`")]
    UnsupportedPropositionKind(String),
    #[error("unsupported constraint type `{0}`")]
    UnsupportedConstraintType(String),
    #[error("proposition {index} (`{function}`) is missing argument `{argument}`")]
    MissingArgument {
        index: usize,
        function: String,
        argument: &'static str,
    },
    #[error("unknown {kind} handle `{handle}`")]
    UnknownHandle { kind: &'static str, handle: String },
    #[error("unsupported argument name `{arg}` in {constraint}")]
    UnsupportedArgName { constraint: &'static str, arg: String },
    #[error("constraint references proposition {index} but only {count} exist")]
    PropositionIndexOutOfRange { index: usize, count: usize },
    #[error("temporal constraint contains a cycle through propositions {0:?}")]
    TemporalCycle(Vec<usize>),
    #[error("episode `{0}` not found in run record")]
    EpisodeNotFound(String),
    #[error("malformed run record for episode `{episode_id}`: {reason}")]
    MalformedRecord { episode_id: String, reason: String },
}

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("missing receptacle asset for receptacle `{receptacle}` (expected {path})")]
    MissingIcon { receptacle: String, path: PathBuf },
    #[error("failed to decode icon {path}: {reason}")]
    Decode { path: PathBuf, reason: String },
    #[error("receptacle `{0}` has no registered icon")]
    Unregistered(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GeometryError {
    #[error("is_next_to graph is not bipartite: `{first}` and `{second}` land on the same side")]
    NotBipartite { first: String, second: String },
}
