// msnrtp - A client/server implementation of Microsoft's .NET Remoting wire format.
// Copyright (C) 2026  driedpampas@proton.me
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! `msnrtpd`: a reference MS-NRTP/MS-NRBF server. Dispatches every call to
//! an echo handler that reflects its arguments back as a `Hashtable`-style
//! reply, useful for interop testing against a real .NET Remoting client.

use clap::Parser;
use msnrtp::config::ServerConfig;
use msnrtp::graph::RemotingValue;
use msnrtp::server::{self, Dispatch};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "msnrtpd", about = "A .NET Remoting (MS-NRTP/MS-NRBF) reference server")]
struct Cli {
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    listen: Option<String>,
    #[arg(long)]
    workers: Option<usize>,
}

struct EchoDispatch;

impl Dispatch for EchoDispatch {
    fn dispatch(&self, type_name: &str, method_name: &str, args: Vec<RemotingValue>) -> Result<RemotingValue, RemotingValue> {
        tracing::debug!(type_name, method_name, arg_count = args.len(), "dispatching call");
        Ok(RemotingValue::Array(args))
    }
}

fn main() -> msnrtp::Result<()> {
    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => ServerConfig::from_file(path)?,
        None => ServerConfig::default(),
    };
    config.apply_overrides(cli.listen, cli.workers);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    server::run(config, Arc::new(EchoDispatch))
}
