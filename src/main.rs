//! Cairn CLI entry point.

use std::collections::HashMap;
use std::process::ExitCode;

use cairn::cli::{commands, Cli, Commands};
use cairn::cluster::ClusterClient;
use cairn::config::Settings;
use cairn::controller::ConductorCli;
use cairn::host;
use cairn::logging;
use cairn::provision::TerraformFactory;
use cairn::ui::Ui;
use clap::Parser;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Handle --no-color
    if cli.no_color {
        std::env::set_var("NO_COLOR", "1");
    }

    let settings = Settings::load();

    // Create the data directory up front; preflight checks only inspect it
    // and report a failure here with a remediation hint.
    let _ = std::fs::create_dir_all(&settings.data_dir);

    // Full execution detail always lands in a log file; the console only
    // sees it with --debug.
    let logfile = logging::prepare_logfile(&settings.logs_dir()).ok();
    logging::init_tracing(cli.debug, logfile);

    tracing::debug!("Cairn starting with args: {:?}", cli);

    let ui = if cli.quiet { Ui::silent() } else { Ui::new() };

    let cluster = ClusterClient::new(&settings.daemon_url);
    let controller = ConductorCli::new(settings.data_dir.join("conductor"));
    let provisioner = TerraformFactory::new(
        settings.template_dir.clone(),
        settings.data_dir.join("etc"),
        HashMap::new(),
    );

    let deployment = commands::Deployment {
        cluster: &cluster,
        controller: &controller,
        provisioner: &provisioner,
        host_checks: commands::host_checks,
        fqdn: host::fqdn(),
        address: host::local_address(),
        settings,
    };

    let Commands::Cluster(cluster_args) = &cli.command;
    match commands::dispatch(&deployment, &cluster_args.command, &ui) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            ui.error(&format!("Error: {}", e));
            ExitCode::from(1)
        }
    }
}
