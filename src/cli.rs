//! Command-line argument parsing for workclock

/// Parsed command line arguments
#[derive(Debug, Default)]
pub struct Args {
    pub resolve: bool,
    pub days: u64,
    pub hours: u64,
    pub date: Option<String>,
    pub validate: bool,
    pub help: bool,
}

pub fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    parse_from(&args)
}

pub fn parse_from(args: &[String]) -> Args {
    let mut result = Args::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--resolve" => result.resolve = true,
            "--days" => {
                if i + 1 < args.len() {
                    i += 1;
                    result.days = args[i].parse().unwrap_or(0);
                }
            }
            "--hours" => {
                if i + 1 < args.len() {
                    i += 1;
                    result.hours = args[i].parse().unwrap_or(0);
                }
            }
            "--date" => {
                if i + 1 < args.len() {
                    i += 1;
                    result.date = Some(args[i].clone());
                }
            }
            "--validate" => result.validate = true,
            "--help" | "-h" => result.help = true,
            _ => {}
        }
        i += 1;
    }

    result
}

pub fn print_help() {
    println!("workclock - business-time resolution service\n");
    println!("USAGE:");
    println!("    workclock [OPTIONS]\n");
    println!("OPTIONS:");
    println!("    --resolve               Resolve one offset, print the instant, and exit");
    println!("    --days N                Business days to add (with --resolve)");
    println!("    --hours N               Business hours to add (with --resolve)");
    println!("    --date ISO              Base instant, ISO-8601 UTC (default: now)");
    println!("    --validate              Validate configuration and exit");
    println!("    --help, -h              Show this help message\n");
    println!("ENVIRONMENT:");
    println!("    HOLIDAYS_URL                   Holiday feed endpoint");
    println!("    HOLIDAY_FETCH_TIMEOUT_SECS     Feed retrieval bound (default: 10)");
    println!("    HOLIDAY_CACHE_MAX_AGE_SECS     Snapshot max age (default: 86400)");
    println!("    HTTP_PORT                      Query server port (default: 3000)");
}
