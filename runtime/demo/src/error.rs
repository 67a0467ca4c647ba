use thiserror::Error;

#[derive(Error, Debug)]
pub enum DemoError {
    #[error("read config `{path}` failed: {source}")]
    ReadConfig {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    InvalidConfig(#[from] wirecall_fabric::Error),

    #[error(transparent)]
    Rpc(#[from] wirecall_rpc::RpcError),

    #[error("installing Ctrl-C handler failed: {0}")]
    Signal(#[from] ctrlc::Error),
}

pub type Result<T> = std::result::Result<T, DemoError>;
