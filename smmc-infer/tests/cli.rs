use clap::Parser;
use smmc_data::common_io::read_to_string;
use smmc_infer::cli::{evaluate, simulate, train, Cli, Commands};
use std::collections::BTreeMap;

fn parse(args: &[&str]) -> Commands {
    let argv = std::iter::once("smmc").chain(args.iter().copied());
    Cli::parse_from(argv).command
}

#[test]
fn simulate_train_evaluate() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = |name: &str| dir.path().join(name).to_string_lossy().to_string();
    let (data, model, metrics) = (path("toy.json.gz"), path("out/gp"), path("metrics.json"));

    let Commands::Simulate(args) = parse(&[
        "simulate", "-o", &data, "--n-points", "8", "--n-trials", "40", "--seed", "1",
    ]) else {
        anyhow::bail!("expected simulate");
    };
    simulate::run(&args)?;

    let Commands::Train(args) = parse(&[
        "train", "-d", &data, "-o", &model, "-m", "svi-gp", "--epochs", "30", "--lr", "0.05",
        "--no-progress", "--save-loss",
    ]) else {
        anyhow::bail!("expected train");
    };
    train::run(&args)?;
    assert_eq!(read_to_string(&format!("{}.loss.txt", model))?.lines().count(), 30);

    let Commands::Evaluate(args) = parse(&[
        "evaluate", "-m", &model, "-d", &data, "--n-posterior-samples", "50",
        "--n-test-points", "20", "-o", &metrics,
    ]) else {
        anyhow::bail!("expected evaluate");
    };
    evaluate::run(&args)?;

    let out: BTreeMap<String, f64> = serde_json::from_str(&read_to_string(&metrics)?)?;
    for key in [
        "mse",
        "mean_relative_error",
        "percent_uncovered",
        "avg_uncertainty_area",
        "evaluation_time",
        "training_time",
    ] {
        assert!(out.contains_key(key), "missing {}", key);
    }
    assert!((0.0..=100.0).contains(&out["percent_uncovered"]));
    Ok(())
}

#[test]
fn method_and_likelihood_names() {
    let Commands::Train(args) = parse(&[
        "train", "-d", "x.json", "-o", "m", "-m", "svi-bnn", "-l", "bernoulli",
        "--architecture", "two-layer",
    ]) else {
        panic!("expected train");
    };
    let config = args.fit_config();
    assert_eq!(args.method, smmc_infer::Method::SviBnn);
    assert_eq!(config.bnn.likelihood, smmc_infer::LikelihoodKind::Bernoulli);
    assert_eq!(config.bnn.architecture, smmc_infer::bnn::Architecture::TwoLayer);
    assert_eq!(config.train.num_epochs, 1000);
}

#[test]
fn verbose_flag_turns_on_logging() {
    let argv = |args: &[&str]| Cli::parse_from(std::iter::once("smmc").chain(args.iter().copied()));
    assert!(argv(&["train", "-d", "x.json", "-o", "m", "-v"]).verbose());
    assert!(!argv(&["train", "-d", "x.json", "-o", "m"]).verbose());
    assert!(argv(&["evaluate", "-m", "m", "-d", "x.json", "--verbose"]).verbose());
    assert!(!argv(&["simulate", "-o", "x.json"]).verbose());
}
