use std::{ collections::HashMap, env, path::Path, time::Duration };

use anyhow::{ Context, Result, anyhow };
use tracing::debug;

pub const ACCESS_KEY_VAR: &str = "TSC_ACCESS_KEY";
pub const SECRET_KEY_VAR: &str = "TSC_SECRET_KEY";
pub const ADMIN_ACCESS_KEY_VAR: &str = "TSC_ADMIN_ACCESS_KEY";
pub const ADMIN_SECRET_KEY_VAR: &str = "TSC_ADMIN_SECRET_KEY";

const REQUEST_TIMEOUT_SECS: u64 = 60;

#[derive(Clone)]
pub struct ScConfig {
    pub base_url: String,
    pub access_key: String,
    pub secret_key: String,
    pub insecure: bool,
    pub timeout: Duration,
}

impl ScConfig {
    pub fn new(server: &str, port: u16, creds: Credentials, insecure: bool) -> Self {
        ScConfig {
            base_url: format!("https://{}:{}", server, port),
            access_key: creds.access_key,
            secret_key: creds.secret_key,
            insecure,
            timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
        }
    }
}

// keys must never end up in logs
impl std::fmt::Debug for ScConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("ScConfig")
            .field("base_url", &self.base_url)
            .field("insecure", &self.insecure)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Credentials").finish_non_exhaustive()
    }
}

/// Reads key/value pairs from an env file. A missing file yields no values.
fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let iter = match dotenvy::from_path_iter(path) {
        Ok(v) => v,
        Err(e) if e.not_found() => {
            debug!("env file {:?} not found, using process environment only", path);
            return Ok(HashMap::new());
        }
        Err(e) => {
            return Err(e).context(format!("cannot open env file {:?}", path));
        }
    };
    let mut vars = HashMap::new();
    for item in iter {
        let (k, v) = item.context(format!("cannot parse env file {:?}", path))?;
        vars.insert(k, v);
    }
    debug!("read {} entries from env file {:?}", vars.len(), path);
    Ok(vars)
}

/// Picks the user or admin key pair. Values already present in the process
/// environment win over the env file.
fn credentials_from<F>(lookup: F, admin: bool) -> Result<Credentials>
    where F: Fn(&str) -> Option<String>
{
    let (ak, sk) = if admin {
        (ADMIN_ACCESS_KEY_VAR, ADMIN_SECRET_KEY_VAR)
    } else {
        (ACCESS_KEY_VAR, SECRET_KEY_VAR)
    };
    let get = |name: &str| {
        lookup(name)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| anyhow!("{} is not set", name))
    };
    Ok(Credentials {
        access_key: get(ak)?,
        secret_key: get(sk)?,
    })
}

pub fn load_credentials(env_file: &Path, admin: bool) -> Result<Credentials> {
    let file_vars = read_env_file(env_file)?;
    credentials_from(|name| env::var(name).ok().or_else(|| file_vars.get(name).cloned()), admin)
}
