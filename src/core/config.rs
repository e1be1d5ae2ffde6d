use std::{collections::BTreeSet, net::IpAddr, path::PathBuf};

use figment::{
	Figment,
	providers::{Env, Format, Toml},
};
use ruma::OwnedServerName;
use serde::Deserialize;

/// All the config options for the typing-notification daemon.
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
	/// This server's own name, used to determine "originated locally" and
	/// to fill `origin` on outgoing federation transactions.
	pub server_name: OwnedServerName,

	/// The address this daemon listens on for both the client-facing and
	/// federation-facing HTTP surfaces.
	#[serde(default = "default_address")]
	pub address: IpAddr,

	/// The port this daemon listens on.
	#[serde(default = "default_port")]
	pub port: u16,

	/// Whether locally-originated typing changes are sent onward to
	/// federated peers. Disabled by default, matching the conservative
	/// default other outgoing-EDU toggles in this family of servers use.
	#[serde(default)]
	pub send_federation: bool,

	/// If set, federation egress is additionally restricted to destination
	/// servers in this set.
	#[serde(default)]
	pub federation_domain_whitelist: Option<BTreeSet<OwnedServerName>>,

	/// How long an inbound federation typing-start EDU is assumed to last
	/// when the remote server gives us no duration of its own (the wire
	/// format for `m.typing` EDUs carries no timeout field).
	#[serde(default = "default_remote_typing_timeout_ms")]
	pub remote_typing_timeout_ms: u64,

	/// `tracing` `EnvFilter` string, e.g. "typing_service=debug,info".
	#[serde(default = "default_log")]
	pub log: String,
}

fn default_address() -> IpAddr { IpAddr::from([127, 0, 0, 1]) }

fn default_port() -> u16 { 8448 }

fn default_remote_typing_timeout_ms() -> u64 { 30_000 }

fn default_log() -> String { String::from("info") }

impl Config {
	/// Loads configuration layered from a TOML file (if present) and
	/// `TYPING__`-prefixed environment variables, with environment taking
	/// precedence.
	pub fn load(path: Option<&PathBuf>) -> crate::Result<Self> {
		let mut figment = Figment::new();

		if let Some(path) = path {
			figment = figment.merge(Toml::file(path));
		}

		figment = figment.merge(Env::prefixed("TYPING__").split("__"));

		Ok(figment.extract()?)
	}

	/// A config with every field defaulted and `server_name` set to `test`,
	/// for use by tests across the workspace that need a [`Config`] but
	/// don't care about its contents. Not behind `cfg(test)`: it needs to be
	/// reachable from other workspace crates' own test builds.
	#[must_use]
	pub fn test_default() -> Self {
		Self {
			server_name: ruma::server_name!("test").to_owned(),
			address: default_address(),
			port: default_port(),
			send_federation: true,
			federation_domain_whitelist: None,
			remote_typing_timeout_ms: default_remote_typing_timeout_ms(),
			log: default_log(),
		}
	}
}
