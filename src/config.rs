//! The handful of configuration knobs the core itself owns: where the server listens, and a read
//! buffer size hint. Everything else (CLI flags, saved config files, presentation) is a shell
//! concern outside this crate.
// (c) 2026 nuke-ms contributors

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::LazyLock;

use figment::providers::{Env, Serialized};
use figment::Figment;
use serde::{Deserialize, Serialize};

/// The default TCP port nuke-ms listens and connects on.
pub const DEFAULT_PORT: u16 = 34443;

static SYSTEM_DEFAULT_CONFIG: LazyLock<Config> = LazyLock::new(|| Config {
    bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
    default_port: DEFAULT_PORT,
    read_buffer_hint: 4096,
});

/// Configuration shared by the server and the client's default connect target.
///
/// There is no `Default` impl with surprising field values; use [`Config::system_default`] for
/// the crate's hard-wired defaults, or build a `Config` directly — this struct imposes no
/// particular source of truth on callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Address the [`DispatchServer`](crate::server::DispatchServer) binds to.
    pub bind_addr: SocketAddr,
    /// Port used when a client's `connect_to` location omits one (reserved for future shell use;
    /// the core's own `host:service` parsing always requires an explicit port today).
    pub default_port: u16,
    /// Suggested initial capacity for inbound body buffers, in bytes.
    pub read_buffer_hint: usize,
}

impl Config {
    /// The crate's hard-wired defaults: `0.0.0.0:34443`, port `34443`, a 4 KiB read hint.
    #[must_use]
    pub fn system_default() -> &'static Self {
        &SYSTEM_DEFAULT_CONFIG
    }

    /// Loads configuration starting from [`Config::system_default`], overridden by any
    /// `NUKE_MS_*` environment variables (e.g. `NUKE_MS_DEFAULT_PORT=5000`).
    ///
    /// # Errors
    /// Returns `figment::Error` if an environment override cannot be deserialized into the
    /// expected field type.
    pub fn load() -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(Self::system_default()))
            .merge(Env::prefixed("NUKE_MS_"))
            .extract()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn system_default_matches_published_constants() {
        let cfg = Config::system_default();
        assert_eq!(cfg.bind_addr.port(), DEFAULT_PORT);
        assert_eq!(cfg.default_port, DEFAULT_PORT);
    }

    #[test]
    fn load_without_overrides_matches_system_default() {
        let cfg = Config::load().unwrap();
        assert_eq!(&cfg, Config::system_default());
    }

    #[test]
    fn env_override_replaces_default_port() {
        std::env::set_var("NUKE_MS_DEFAULT_PORT", "5000");
        let cfg = Config::load().unwrap();
        std::env::remove_var("NUKE_MS_DEFAULT_PORT");
        assert_eq!(cfg.default_port, 5000);
    }
}
