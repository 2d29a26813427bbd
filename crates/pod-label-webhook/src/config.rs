use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, anyhow};
use clap::ArgMatches;
use directories::UserDirs;
use lazy_static::lazy_static;

use crate::mutation::MutationSettings;

pub static SERVICE_NAME: &str = "pod-label-webhook";

lazy_static! {
    pub(crate) static ref HOSTNAME: String =
        std::env::var("HOSTNAME").unwrap_or_else(|_| String::from("unknown"));
}

pub struct Config {
    pub addr: SocketAddr,
    pub tls_config: Option<TlsConfig>,
    pub mutation_timeout_seconds: Option<u64>,
    pub cluster_credentials: ClusterCredentials,
    pub log_level: String,
    pub log_fmt: String,
    pub log_no_color: bool,
}

#[derive(Clone, Debug)]
pub struct TlsConfig {
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
}

/// Where credentials for the surrounding cluster come from.
///
/// The webhook does not talk to the API server, the value is only
/// reported at startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClusterCredentials {
    /// Service account token mounted into the pod.
    InCluster,
    Kubeconfig(PathBuf),
}

impl Config {
    pub fn from_args(matches: &ArgMatches) -> Result<Self> {
        let addr = api_bind_address(matches)?;
        let tls_config = tls_config(matches)?;

        let mutation_timeout_seconds = if *matches
            .get_one::<bool>("disable-timeout-protection")
            .expect("clap should have set a default value")
        {
            None
        } else {
            Some(
                matches
                    .get_one::<String>("mutation-timeout")
                    .expect("mutation-timeout should always be set")
                    .parse::<u64>()
                    .map_err(|e| anyhow!("error parsing --mutation-timeout: {e}"))?,
            )
        };

        let use_kubeconfig = *matches
            .get_one::<bool>("use-kubeconfig")
            .expect("clap should have set a default value");
        let kubeconfig = matches.get_one::<String>("kubeconfig").map(PathBuf::from);
        let cluster_credentials = cluster_credentials(use_kubeconfig, kubeconfig)?;

        let log_level = matches
            .get_one::<String>("log-level")
            .expect("This should not happen, there's a default value for log-level")
            .to_owned();
        let log_fmt = matches
            .get_one::<String>("log-fmt")
            .expect("This should not happen, there's a default value for log-fmt")
            .to_owned();
        let log_no_color = matches
            .get_one::<bool>("log-no-color")
            .expect("clap should have assigned a default value")
            .to_owned();

        Ok(Self {
            addr,
            tls_config,
            mutation_timeout_seconds,
            cluster_credentials,
            log_level,
            log_fmt,
            log_no_color,
        })
    }

    pub fn mutation_settings(&self) -> MutationSettings {
        MutationSettings {
            mutation_timeout: self.mutation_timeout_seconds.map(Duration::from_secs),
        }
    }
}

fn api_bind_address(matches: &ArgMatches) -> Result<SocketAddr> {
    format!(
        "{}:{}",
        matches
            .get_one::<String>("address")
            .expect("clap should have set a default value"),
        matches
            .get_one::<String>("port")
            .expect("clap should have set a default value")
    )
    .parse()
    .map_err(|e| anyhow!("error parsing arguments: {}", e))
}

fn tls_config(matches: &ArgMatches) -> Result<Option<TlsConfig>> {
    let cert_file = matches
        .get_one::<String>("tls-cert-file")
        .expect("clap should have set a default value");
    let key_file = matches
        .get_one::<String>("tls-key-file")
        .expect("clap should have set a default value");

    match (cert_file.is_empty(), key_file.is_empty()) {
        (true, true) => Ok(None),
        (false, false) => Ok(Some(TlsConfig {
            cert_file: PathBuf::from(cert_file),
            key_file: PathBuf::from(key_file),
        })),
        _ => Err(anyhow!(
            "error parsing arguments: either both --tls-cert-file and --tls-key-file must be provided, or neither"
        )),
    }
}

fn cluster_credentials(
    use_kubeconfig: bool,
    kubeconfig: Option<PathBuf>,
) -> Result<ClusterCredentials> {
    if !use_kubeconfig {
        return Ok(ClusterCredentials::InCluster);
    }

    match kubeconfig.filter(|path| !path.as_os_str().is_empty()) {
        Some(path) => Ok(ClusterCredentials::Kubeconfig(path)),
        None => UserDirs::new()
            .map(|dirs| ClusterCredentials::Kubeconfig(dirs.home_dir().join(".kube").join("config")))
            .ok_or_else(|| anyhow!("cannot find the home directory to locate the kubeconfig file")),
    }
}
