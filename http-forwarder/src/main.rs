// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Command line front end for the http-forwarder library.

mod args;

use args::ForwarderArgs;
use clap::Parser;
use forwarder_common::util::forwarder_logger;
use log::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    forwarder_logger::init("http-forwarder");
    let args = ForwarderArgs::parse();

    let target = args.proxy_target()?;
    let forwarder = http_forwarder::start(target, args.forwarder_config()).await?;
    println!("{}", forwarder.local_addr());

    tokio::signal::ctrl_c().await?;
    info!("Interrupted, shutting down");
    forwarder.stop();
    forwarder.join().await?;
    Ok(())
}
