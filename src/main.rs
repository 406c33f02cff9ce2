use magsearch::prelude::*;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let mut params = GpsParams::default();
    let mut cov_path: Option<String> = None;
    let mut knowledge_path: Option<String> = None;
    let mut print_pag = false;
    let mut ricf_orient = false;

    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--restarts" => {
                let v = args.get(i + 1).unwrap_or_else(|| usage_and_exit(2));
                params.restarts = v.parse().unwrap_or_else(|_| usage_and_exit(2));
                i += 2;
            }
            "--max-it" => {
                let v = args.get(i + 1).unwrap_or_else(|| usage_and_exit(2));
                params.max_iterations = v.parse().unwrap_or_else(|_| usage_and_exit(2));
                i += 2;
            }
            "--tabu" => {
                let v = args.get(i + 1).unwrap_or_else(|| usage_and_exit(2));
                params.tabu_length = v.parse().unwrap_or_else(|_| usage_and_exit(2));
                params.tabu_enabled = true;
                i += 2;
            }
            "--no-tabu" => {
                params.tabu_enabled = false;
                i += 1;
            }
            "--seed" => {
                let v = args.get(i + 1).unwrap_or_else(|| usage_and_exit(2));
                params.seed = Some(v.parse().unwrap_or_else(|_| usage_and_exit(2)));
                i += 2;
            }
            "--tol" => {
                let v = args.get(i + 1).unwrap_or_else(|| usage_and_exit(2));
                params.ricf_tolerance = v.parse().unwrap_or_else(|_| usage_and_exit(2));
                i += 2;
            }
            "--perturb" => {
                let v = args.get(i + 1).unwrap_or_else(|| usage_and_exit(2));
                params.perturbation_moves = v.parse().unwrap_or_else(|_| usage_and_exit(2));
                i += 2;
            }
            "--knowledge" => {
                let v = args.get(i + 1).unwrap_or_else(|| usage_and_exit(2));
                knowledge_path = Some(v.clone());
                i += 2;
            }
            "--parallel" => {
                params.parallel = true;
                i += 1;
            }
            "--pag" => {
                print_pag = true;
                i += 1;
            }
            "--ricf-orient" => {
                ricf_orient = true;
                i += 1;
            }
            "--help" | "-h" => usage_and_exit(0),
            s if s.starts_with('-') => usage_and_exit(2),
            s => {
                if cov_path.replace(s.to_string()).is_some() {
                    usage_and_exit(2);
                }
                i += 1;
            }
        }
    }

    let Some(cov_path) = cov_path else {
        usage_and_exit(2);
    };
    if let Err(e) = params.validate() {
        eprintln!("Invalid options: {e}");
        std::process::exit(2);
    }

    let cov = read_input(&cov_path, CovarianceMatrix::parse);
    let knowledge = knowledge_path.map_or_else(Knowledge::new, |p| read_input(&p, Knowledge::parse));

    let tolerance = params.ricf_tolerance;
    let gps = Gps::with_covariance(cov.clone(), params).unwrap_or_else(|e| {
        eprintln!("Invalid input: {e}");
        std::process::exit(1);
    });
    let result = gps.search();

    println!("Best MAG (score {:.6}):", result.score);
    println!("{}", result.graph);
    for s in &result.restarts {
        println!(
            "restart {:>3}: score {:>14.6}  moves {:>4}  evaluations {:>7}{}",
            s.restart,
            s.score,
            s.iterations,
            s.evaluations,
            if s.cancelled { "  (cancelled)" } else { "" }
        );
    }

    if print_pag {
        let pag = magsearch::pag::mag_to_pag_with(&result.graph, &knowledge);
        println!();
        println!("PAG:");
        println!("{pag}");
    }

    if ricf_orient {
        let mut oriented = result.graph.clone();
        if let Err(e) = orient_with_ricf(&mut oriented, &cov, &knowledge, tolerance) {
            eprintln!("Orientation failed: {e}");
            std::process::exit(1);
        }
        println!();
        println!("RICF-oriented skeleton:");
        println!("{oriented}");
    }
}

fn read_input<T>(path: &str, parse: impl Fn(&str) -> Result<T, ParseError>) -> T {
    let text = std::fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("Cannot read {path}: {e}");
        std::process::exit(1);
    });
    parse(&text).unwrap_or_else(|e| {
        eprintln!("{path}: {e}");
        std::process::exit(1);
    })
}

fn usage_and_exit(code: i32) -> ! {
    eprintln!(
        "Usage:\n  magsearch <covariance-file> [options]\n\nOptions:\n  --restarts N         Number of restarts (default: 10)\n  --max-it N           Max accepted moves per restart (default: 1000)\n  --tabu N             Tabu list length (default: 25)\n  --no-tabu            Disable the tabu list\n  --seed SEED          Deterministic base seed (optional)\n  --tol T              RICF tolerance (default: 1e-6)\n  --perturb N          Random additions at the start of restarts after the first (default: 3)\n  --parallel           Run restarts on all cores\n  --knowledge FILE     Background knowledge for PAG output and orientation\n  --pag                Also print the PAG of the best MAG\n  --ricf-orient        Also orient the best skeleton by RICF score comparison\n\nLogging is controlled by RUST_LOG (default: info).\n"
    );
    std::process::exit(code)
}
