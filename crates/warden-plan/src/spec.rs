//! Service and check spec shapes (§3), in both their as-parsed (partial,
//! one layer's contribution) and effective (flattened, fully resolved)
//! forms.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use warden_types::{CheckLevel, CheckName, OnCheckFailureAction, RestartPolicy, ServiceName, StartupMode};

fn default_initial_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_backoff_max() -> Duration {
    Duration::from_secs(30)
}

fn default_kill_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_okay_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_period() -> Duration {
    Duration::from_secs(10)
}

fn default_timeout() -> Duration {
    Duration::from_secs(3)
}

fn default_threshold() -> u32 {
    3
}

/// Backoff parameters for service restart (§3 invariants: `factor >= 1`,
/// `initial delay > 0`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffSpec {
    #[serde(default = "default_initial_delay", with = "crate::duration::human")]
    pub initial_delay: Duration,
    #[serde(default = "default_backoff_factor")]
    pub factor: f64,
    #[serde(default = "default_backoff_max", with = "crate::duration::human")]
    pub max: Duration,
}

impl Default for BackoffSpec {
    fn default() -> Self {
        Self {
            initial_delay: default_initial_delay(),
            factor: default_backoff_factor(),
            max: default_backoff_max(),
        }
    }
}

/// One layer's (partial) contribution to a named service. Fields that this
/// layer doesn't mention are `None` and do not participate in the merge
/// (§4.1 combine rules).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceSpecPartial {
    pub command: Option<Vec<String>>,
    #[serde(default)]
    pub environment: Option<BTreeMap<String, String>>,
    pub working_dir: Option<String>,
    pub user: Option<String>,
    pub group: Option<String>,
    pub startup: Option<StartupMode>,
    pub restart: Option<RestartPolicy>,
    pub backoff: Option<BackoffSpec>,
    #[serde(default)]
    pub requires: Option<Vec<ServiceName>>,
    #[serde(default)]
    pub before: Option<Vec<ServiceName>>,
    #[serde(default)]
    pub after: Option<Vec<ServiceName>>,
    #[serde(with = "crate::duration::human_option", default)]
    pub kill_delay: Option<Duration>,
    #[serde(with = "crate::duration::human_option", default)]
    pub okay_delay: Option<Duration>,
    #[serde(default)]
    pub on_check_failure: Option<BTreeMap<CheckName, OnCheckFailureAction>>,
    #[serde(default)]
    pub log_targets: Option<Vec<String>>,
    pub on_start: Option<Vec<String>>,
    pub on_stop: Option<Vec<String>>,
}

/// The fully resolved, effective service spec after flattening all layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub command: Vec<String>,
    pub environment: BTreeMap<String, String>,
    pub working_dir: Option<String>,
    pub user: Option<String>,
    pub group: Option<String>,
    pub startup: StartupMode,
    pub restart: RestartPolicy,
    pub backoff: BackoffSpec,
    pub requires: Vec<ServiceName>,
    pub before: Vec<ServiceName>,
    pub after: Vec<ServiceName>,
    pub kill_delay: Duration,
    pub okay_delay: Duration,
    pub on_check_failure: BTreeMap<CheckName, OnCheckFailureAction>,
    pub log_targets: Vec<String>,
    pub on_start: Option<Vec<String>>,
    pub on_stop: Option<Vec<String>>,
}

impl ServiceSpec {
    pub(crate) fn from_partial(name: &ServiceName, partial: ServiceSpecPartial) -> Result<Self, crate::PlanError> {
        let command = partial
            .command
            .filter(|c| !c.is_empty())
            .ok_or_else(|| crate::PlanError::MissingCommand { service: name.clone() })?;

        let backoff = partial.backoff.unwrap_or_default();
        if backoff.factor < 1.0 {
            return Err(crate::PlanError::InvalidBackoffFactor {
                service: name.clone(),
                factor: backoff.factor,
            });
        }
        if backoff.initial_delay.is_zero() {
            return Err(crate::PlanError::InvalidBackoffInitialDelay { service: name.clone() });
        }

        Ok(Self {
            command,
            environment: partial.environment.unwrap_or_default(),
            working_dir: partial.working_dir,
            user: partial.user,
            group: partial.group,
            startup: partial.startup.unwrap_or(StartupMode::Disabled),
            restart: partial.restart.unwrap_or(RestartPolicy::Never),
            backoff,
            requires: partial.requires.unwrap_or_default(),
            before: partial.before.unwrap_or_default(),
            after: partial.after.unwrap_or_default(),
            kill_delay: partial.kill_delay.unwrap_or_else(default_kill_delay),
            okay_delay: partial.okay_delay.unwrap_or_else(default_okay_delay),
            on_check_failure: partial.on_check_failure.unwrap_or_default(),
            log_targets: partial.log_targets.unwrap_or_default(),
            on_start: partial.on_start,
            on_stop: partial.on_stop,
        })
    }
}

/// One layer's (partial) contribution to a named check.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckSpecPartial {
    pub level: Option<CheckLevel>,
    #[serde(with = "crate::duration::human_option", default)]
    pub period: Option<Duration>,
    #[serde(with = "crate::duration::human_option", default)]
    pub timeout: Option<Duration>,
    pub threshold: Option<u32>,
    pub startup: Option<StartupMode>,
    pub http: Option<HttpProbePartial>,
    pub tcp: Option<TcpProbePartial>,
    pub exec: Option<ExecProbePartial>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HttpProbePartial {
    pub url: Option<String>,
    #[serde(default)]
    pub headers: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TcpProbePartial {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecProbePartial {
    pub command: Option<Vec<String>>,
    #[serde(default)]
    pub environment: Option<BTreeMap<String, String>>,
    pub working_dir: Option<String>,
    pub user: Option<String>,
    pub group: Option<String>,
}

/// Exactly one probe variant (§3 check spec invariant).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeSpec {
    Http { url: String, headers: BTreeMap<String, String> },
    Tcp { host: String, port: u16 },
    Exec {
        command: Vec<String>,
        environment: BTreeMap<String, String>,
        working_dir: Option<String>,
        user: Option<String>,
        group: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckSpec {
    pub level: Option<CheckLevel>,
    pub period: Duration,
    pub timeout: Duration,
    pub threshold: u32,
    pub startup: StartupMode,
    pub probe: ProbeSpec,
}

impl CheckSpec {
    pub(crate) fn from_partial(name: &CheckName, partial: CheckSpecPartial) -> Result<Self, crate::PlanError> {
        let present = [
            partial.http.is_some(),
            partial.tcp.is_some(),
            partial.exec.is_some(),
        ]
        .into_iter()
        .filter(|x| *x)
        .count();

        let probe = match present {
            0 => return Err(crate::PlanError::MissingProbe { check: name.clone() }),
            1 => {
                if let Some(http) = partial.http {
                    ProbeSpec::Http {
                        url: http.url.unwrap_or_default(),
                        headers: http.headers.unwrap_or_default(),
                    }
                } else if let Some(tcp) = partial.tcp {
                    ProbeSpec::Tcp {
                        host: tcp.host.unwrap_or_else(|| "localhost".to_string()),
                        port: tcp.port.unwrap_or_default(),
                    }
                } else {
                    let exec = partial.exec.unwrap();
                    ProbeSpec::Exec {
                        command: exec.command.unwrap_or_default(),
                        environment: exec.environment.unwrap_or_default(),
                        working_dir: exec.working_dir,
                        user: exec.user,
                        group: exec.group,
                    }
                }
            }
            _ => return Err(crate::PlanError::AmbiguousProbe { check: name.clone() }),
        };

        Ok(Self {
            level: partial.level,
            period: partial.period.unwrap_or_else(default_period),
            timeout: partial.timeout.unwrap_or_else(default_timeout),
            threshold: partial.threshold.unwrap_or_else(default_threshold),
            startup: partial.startup.unwrap_or(StartupMode::Disabled),
            probe,
        })
    }
}
