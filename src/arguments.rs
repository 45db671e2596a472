use {
    super::*,
    clap::builder::styling::{AnsiColor, Effects, Styles},
    crate::controller::Controller,
};

#[derive(Debug, Parser)]
#[command(
  version,
  styles = Styles::styled()
    .error(AnsiColor::Red.on_default() | Effects::BOLD)
    .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
    .invalid(AnsiColor::Red.on_default())
    .literal(AnsiColor::Blue.on_default())
    .placeholder(AnsiColor::Cyan.on_default())
    .usage(AnsiColor::Yellow.on_default() | Effects::BOLD)
    .valid(AnsiColor::Green.on_default()),
)]
pub(crate) struct Arguments {
    #[arg(long, help = "Run the hash kernel micro-benchmark and exit.")]
    pub(crate) benchmark: bool,

    #[arg(
        help = "Pool endpoint <STRATUM_URL>, stratum+tcp://host:port.",
        required_unless_present = "benchmark"
    )]
    pub(crate) stratum_url: Option<String>,

    #[arg(help = "Pool <WORKER> name.", required_unless_present = "benchmark")]
    pub(crate) worker: Option<String>,

    #[arg(help = "Pool <PASSWORD>.", required_unless_present = "benchmark")]
    pub(crate) password: Option<String>,

    #[arg(help = "Node <P2P> endpoint, host:port. Enables the whale watcher.")]
    pub(crate) p2p: Option<String>,

    #[arg(
        long,
        env = "KRILL_CPU_CORES",
        help = "Mine with <CPU_CORES> threads. [default: cores minus two]"
    )]
    pub(crate) cpu_cores: Option<usize>,
}

impl Arguments {
    pub(crate) fn run(self) -> Result {
        if self.benchmark {
            return benchmark::run();
        }

        let stratum_url = self
            .stratum_url
            .ok_or_else(|| anyhow!("stratum url required"))?;

        let controller = Controller {
            stratum_address: stratum_address(&stratum_url)?,
            username: self.worker.ok_or_else(|| anyhow!("worker required"))?,
            password: self.password,
            p2p_address: self.p2p,
            cpu_cores: self.cpu_cores,
        };

        Runtime::new()?.block_on(async {
            let cancel = controller::setup_signal_handler();
            controller.run(cancel).await
        })
    }
}

fn stratum_address(url: &str) -> Result<String> {
    let address = url.strip_prefix("stratum+tcp://").unwrap_or(url);

    ensure!(
        !address.is_empty() && !address.contains('/') && address.rsplit_once(':').is_some(),
        "stratum url must look like stratum+tcp://host:port, got `{url}`",
    );

    Ok(address.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &str) -> Arguments {
        match Arguments::try_parse_from(args.split_whitespace()) {
            Ok(arguments) => arguments,
            Err(err) => panic!("error parsing arguments: {err}"),
        }
    }

    #[test]
    fn positional_args() {
        let arguments = parse("krill stratum+tcp://pool.example.com:3333 worker1 x");

        assert_eq!(
            arguments.stratum_url,
            Some("stratum+tcp://pool.example.com:3333".into())
        );
        assert_eq!(arguments.worker, Some("worker1".into()));
        assert_eq!(arguments.password, Some("x".into()));
        assert_eq!(arguments.p2p, None);
        assert!(!arguments.benchmark);
    }

    #[test]
    fn trailing_p2p_endpoint() {
        let arguments =
            parse("krill stratum+tcp://pool.example.com:3333 worker1 x node.example.com:8333");

        assert_eq!(arguments.p2p, Some("node.example.com:8333".into()));
    }

    #[test]
    fn cpu_cores_flag() {
        let arguments = parse("krill stratum+tcp://pool:3333 w x --cpu-cores 4");
        assert_eq!(arguments.cpu_cores, Some(4));
    }

    #[test]
    fn benchmark_requires_nothing_else() {
        let arguments = parse("krill --benchmark");
        assert!(arguments.benchmark);
        assert_eq!(arguments.stratum_url, None);
    }

    #[test]
    fn missing_positionals_is_a_parse_error() {
        assert!(Arguments::try_parse_from(["krill", "stratum+tcp://pool:3333"]).is_err());
        assert!(Arguments::try_parse_from(["krill"]).is_err());
    }

    #[test]
    fn stratum_address_strips_the_scheme() {
        assert_eq!(
            stratum_address("stratum+tcp://pool.example.com:3333").unwrap(),
            "pool.example.com:3333"
        );
        assert_eq!(stratum_address("pool.example.com:3333").unwrap(), "pool.example.com:3333");
    }

    #[test]
    fn stratum_address_rejects_garbage() {
        assert!(stratum_address("stratum+tcp://").is_err());
        assert!(stratum_address("http://pool.example.com/path").is_err());
        assert!(stratum_address("pool.example.com").is_err());
    }
}
