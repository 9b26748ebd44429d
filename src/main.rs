use loopcost::{
    kernels::{self, LoopOrder},
    AccessOrder, CacheModel, LoopCostAnalysis, Options,
};

const USAGE: &str =
    "usage: loopcost [--size N] [--line-size N] [--order ijk] [--column-major] [--verbose]";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = pico_args::Arguments::from_env();

    if args.contains(["-h", "--help"]) {
        println!("{}", USAGE);
        return Ok(());
    }

    let verbose = args.contains(["-v", "--verbose"]);
    let column_major = args.contains("--column-major");
    let size: i64 = args.opt_value_from_str("--size")?.unwrap_or(5000);
    let line_size: u32 = args
        .opt_value_from_str("--line-size")?
        .unwrap_or(CacheModel::DEFAULT_LINE_SIZE);
    let order: LoopOrder = args.opt_value_from_str("--order")?.unwrap_or_default();

    let remaining = args.finish();
    if !remaining.is_empty() {
        return Err(format!("unexpected arguments {:?}\n{}", remaining, USAGE).into());
    }

    let filter = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter))
        .format_timestamp(None)
        .init();

    let options = Options {
        cache: CacheModel::with_line_size(line_size)?,
        access_order: if column_major {
            AccessOrder::ColumnMajor
        } else {
            AccessOrder::RowMajor
        },
    };

    let mut proc = kernels::matmul(size, order);
    if verbose {
        println!("{}", proc.display_());
    }

    let costs = LoopCostAnalysis::run(&mut proc, &options)?;
    print!("{}", costs.display_costs());
    print!("{}", costs.display_trip_counts());

    Ok(())
}
