//! Compute marginal covariances along a simulated pose chain.
//!
//! Builds a linear pose chain with a prior on the first pose and odometry
//! factors between consecutive poses, eliminates it, and reports per-pose
//! uncertainty plus the joint covariance of the chain endpoints.

use clap::Parser;
use nalgebra::{DMatrix, DVector};

use graph_marginals::core::{default_key_formatter, Key, LinearizationPoint};
use graph_marginals::linear::{DiagonalNoise, GaussianFactorGraph, JacobianFactor};
use graph_marginals::{init_logger, Factorization, Marginals};

#[derive(Parser)]
#[command(name = "chain_marginals")]
#[command(about = "Marginal covariance estimation on a simulated pose chain")]
struct Args {
    /// Number of poses in the chain
    #[arg(short, long, default_value = "8")]
    poses: usize,

    /// Tangent-space dimension per pose (3 for SE2, 6 for SE3)
    #[arg(short, long, default_value = "3")]
    dim: usize,

    /// Odometry noise sigma
    #[arg(long, default_value = "0.1")]
    odometry_sigma: f64,

    /// Prior noise sigma on the first pose
    #[arg(long, default_value = "0.01")]
    prior_sigma: f64,

    /// Factorization strategy: "cholesky" (fast) or "qr" (robust)
    #[arg(short, long, default_value = "cholesky")]
    factorization: String,

    /// Print the stored graph, solution, and Bayes tree
    #[arg(short, long)]
    verbose: bool,
}

fn build_chain(args: &Args) -> (GaussianFactorGraph, LinearizationPoint) {
    let dim = args.dim;
    let mut graph = GaussianFactorGraph::new();

    let prior_noise = DiagonalNoise::isotropic(dim, args.prior_sigma)
        .expect("prior sigma must be positive");
    graph.add(
        JacobianFactor::from_terms(
            vec![(0, DMatrix::identity(dim, dim))],
            &DVector::zeros(dim),
            Some(prior_noise),
        )
        .expect("prior factor construction"),
    );

    for i in 1..args.poses {
        let noise = DiagonalNoise::isotropic(dim, args.odometry_sigma)
            .expect("odometry sigma must be positive");
        graph.add(
            JacobianFactor::from_terms(
                vec![
                    (i as Key - 1, -DMatrix::<f64>::identity(dim, dim)),
                    (i as Key, DMatrix::<f64>::identity(dim, dim)),
                ],
                &DVector::zeros(dim),
                Some(noise),
            )
            .expect("odometry factor construction"),
        );
    }

    let solution: LinearizationPoint = (0..args.poses as Key)
        .map(|k| (k, DVector::zeros(dim)))
        .collect();

    (graph, solution)
}

fn main() {
    init_logger();
    let args = Args::parse();

    let factorization = match args.factorization.as_str() {
        "cholesky" => Factorization::Cholesky,
        "qr" => Factorization::Qr,
        other => {
            eprintln!("unknown factorization '{other}', expected 'cholesky' or 'qr'");
            std::process::exit(1);
        }
    };

    println!(
        "=== Marginal covariances: {} poses of dimension {}, {:?} factorization ===\n",
        args.poses, args.dim, factorization
    );

    let (graph, solution) = build_chain(&args);
    let marginals = match Marginals::from_linear(graph, solution, factorization) {
        Ok(marginals) => marginals,
        Err(e) => {
            eprintln!("elimination failed: {e}");
            std::process::exit(1);
        }
    };

    if args.verbose {
        marginals.print("", &default_key_formatter);
    }

    println!("Per-pose standard deviations (1-sigma, tangent space):");
    for key in 0..args.poses as Key {
        match marginals.marginal_covariance(key) {
            Ok(cov) => {
                let sigmas: Vec<String> = (0..cov.nrows())
                    .map(|i| format!("{:.4}", cov[(i, i)].sqrt()))
                    .collect();
                println!("  {}: [{}]", default_key_formatter(key), sigmas.join(", "));
            }
            Err(e) => println!("  {}: {e}", default_key_formatter(key)),
        }
    }

    let first = 0;
    let last = args.poses as Key - 1;
    match marginals.joint_marginal_covariance(&[first, last]) {
        Ok(joint) => {
            println!(
                "\nJoint covariance of {} and {}:",
                default_key_formatter(first),
                default_key_formatter(last)
            );
            println!("{}", joint.full());
            let cross = joint
                .at(first, last)
                .expect("both keys are part of the joint");
            println!("Cross-covariance block:\n{cross}");
        }
        Err(e) => eprintln!("joint query failed: {e}"),
    }
}
