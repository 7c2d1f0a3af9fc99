use clap::{Parser, Subcommand, ValueEnum};
use anyhow::{Context, Result};

use herd_kinship_core as kinship;
use kinship::genetics::{
    analyze_animal, ancestors, descendants, find_compatible_mates, simulate_mating, to_percent,
    KinshipEngine, Lineage, Pedigree, RiskPolicy,
};
use kinship::AnimalId;

#[derive(Parser)]
#[command(name = "herdkin")]
#[command(version)]
#[command(about = "Pedigree inbreeding, coancestry and mating risk screening")]
struct Cli {
    /// Path to pedigree CSV (columns: animal, sire, dam, sex)
    #[arg(short, long, global = true)]
    pedigree: Option<String>,

    /// Output format
    #[arg(long, value_enum, default_value_t = Format::Text, global = true)]
    format: Format,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Inbreeding coefficient of every animal
    Inbreeding,

    /// Coancestry and additive relationship between two animals
    Coancestry {
        #[arg(long)]
        a: AnimalId,

        #[arg(long)]
        b: AnimalId,
    },

    /// Predict offspring inbreeding for a sire x dam mating
    Simulate {
        #[arg(long)]
        sire: AnimalId,

        #[arg(long)]
        dam: AnimalId,

        /// JSON file with risk thresholds (high_threshold, severe_threshold)
        #[arg(long)]
        policy: Option<String>,
    },

    /// Rank opposite-sex mates for an animal by offspring inbreeding
    Mates {
        #[arg(long)]
        target: AnimalId,

        /// Maximum acceptable offspring inbreeding, in percent
        #[arg(long, default_value = "6.25")]
        max_inbreeding: f64,

        /// JSON file with risk thresholds (high_threshold, severe_threshold)
        #[arg(long)]
        policy: Option<String>,
    },

    /// Inbreeding risk report for one animal
    Analyze {
        #[arg(long)]
        animal: AnimalId,

        /// JSON file with risk thresholds (high_threshold, severe_threshold)
        #[arg(long)]
        policy: Option<String>,
    },

    /// Ancestors and descendants of an animal by generation
    Lineage {
        #[arg(long)]
        animal: AnimalId,

        #[arg(long, default_value = "5")]
        ancestor_generations: usize,

        #[arg(long, default_value = "3")]
        descendant_generations: usize,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let pedigree_path = cli
        .pedigree
        .as_deref()
        .context("A pedigree CSV is required (--pedigree <file>)")?;
    let mut engine = load_engine(pedigree_path)?;
    let format = cli.format;

    match cli.command {
        Commands::Inbreeding => cmd_inbreeding(&mut engine, format),
        Commands::Coancestry { a, b } => cmd_coancestry(&mut engine, a, b, format),
        Commands::Simulate { sire, dam, policy } => {
            let policy = load_policy(policy.as_deref())?;
            let result = simulate_mating(&mut engine, sire, dam, &policy)
                .context("Mating simulation failed")?;
            match format {
                Format::Json => print_json(&result),
                Format::Text => {
                    println!("Mating {} x {}", result.sire_id, result.dam_id);
                    println!("  Sire inbreeding:      {:.2}%", result.sire_inbreeding_pct);
                    println!("  Dam inbreeding:       {:.2}%", result.dam_inbreeding_pct);
                    println!("  Parent relationship:  {:.2}%", result.relationship_pct);
                    println!("  Offspring inbreeding: {:.2}%", result.offspring_inbreeding_pct);
                    println!("  Risk: {} ({})", result.risk, result.recommendation);
                    Ok(())
                }
            }
        }
        Commands::Mates {
            target,
            max_inbreeding,
            policy,
        } => cmd_mates(&mut engine, target, max_inbreeding, policy.as_deref(), format),
        Commands::Analyze { animal, policy } => {
            let policy = load_policy(policy.as_deref())?;
            let report = analyze_animal(&mut engine, animal, &policy)
                .with_context(|| format!("Failed to analyse animal {}", animal))?;
            match format {
                Format::Json => print_json(&report),
                Format::Text => {
                    println!("Animal {} ({})", report.animal_id, report.sex);
                    println!("  Sire: {}", display_parent(report.sire_id));
                    println!("  Dam:  {}", display_parent(report.dam_id));
                    println!("  Inbreeding: {:.2}% [{}]", report.inbreeding_pct, report.risk);
                    println!(
                        "  Common ancestors of parents: {:?}",
                        report.parental_common_ancestors
                    );
                    println!(
                        "  Known ancestors: {}, known descendants: {}",
                        report.known_ancestors, report.known_descendants
                    );
                    Ok(())
                }
            }
        }
        Commands::Lineage {
            animal,
            ancestor_generations,
            descendant_generations,
        } => {
            let ped = engine.pedigree();
            let up = ancestors(ped, animal, ancestor_generations)
                .context("Ancestor traversal failed")?;
            let down = descendants(ped, animal, descendant_generations)
                .context("Descendant traversal failed")?;
            match format {
                Format::Json => print_json(&serde_json::json!({
                    "animal_id": animal,
                    "ancestors": up,
                    "descendants": down,
                })),
                Format::Text => {
                    println!("Ancestors of {}:", animal);
                    print_lineage(&up);
                    println!("Descendants of {}:", animal);
                    print_lineage(&down);
                    Ok(())
                }
            }
        }
    }
}

fn load_engine(path: &str) -> Result<KinshipEngine> {
    let ped = Pedigree::from_csv(path)
        .with_context(|| format!("Failed to load pedigree from '{}'", path))?;
    eprintln!("Loaded pedigree with {} animals from '{}'", ped.len(), path);
    if !ped.cyclic_animals().is_empty() {
        eprintln!(
            "Warning: {} animals are their own ancestor; related coefficients are approximate",
            ped.cyclic_animals().len()
        );
    }
    Ok(KinshipEngine::from(ped))
}

fn load_policy(path: Option<&str>) -> Result<RiskPolicy> {
    match path {
        Some(p) => RiskPolicy::from_json_file(p)
            .with_context(|| format!("Failed to load risk policy from '{}'", p)),
        None => Ok(RiskPolicy::default()),
    }
}

fn cmd_inbreeding(engine: &mut KinshipEngine, format: Format) -> Result<()> {
    let all = engine.inbreeding_all();
    log::debug!("Inbreeding engine stats: {:?}", engine.stats());

    match format {
        Format::Json => {
            let rows: Vec<serde_json::Value> = all
                .iter()
                .map(|&(id, f)| {
                    serde_json::json!({
                        "animal_id": id,
                        "inbreeding": f,
                        "inbreeding_pct": to_percent(f),
                    })
                })
                .collect();
            print_json(&rows)
        }
        Format::Text => {
            println!("{:>12}  {:>10}", "animal", "F (%)");
            for (id, f) in &all {
                println!("{:>12}  {:>10.2}", id, to_percent(*f));
            }
            let inbred = all.iter().filter(|(_, f)| *f > 0.0).count();
            let mean = if all.is_empty() {
                0.0
            } else {
                all.iter().map(|(_, f)| f).sum::<f64>() / all.len() as f64
            };
            println!("\n{} of {} animals inbred; mean F = {:.4}", inbred, all.len(), mean);
            Ok(())
        }
    }
}

fn cmd_coancestry(
    engine: &mut KinshipEngine,
    a: AnimalId,
    b: AnimalId,
    format: Format,
) -> Result<()> {
    let coancestry = engine.coancestry(a, b);
    let relationship = 2.0 * coancestry;

    match format {
        Format::Json => print_json(&serde_json::json!({
            "a": a,
            "b": b,
            "coancestry": coancestry,
            "relationship": relationship,
        })),
        Format::Text => {
            println!("Coancestry({}, {}):   {:.6}", a, b, coancestry);
            println!("Relationship({}, {}): {:.6}", a, b, relationship);
            Ok(())
        }
    }
}

fn cmd_mates(
    engine: &mut KinshipEngine,
    target: AnimalId,
    max_inbreeding: f64,
    policy_path: Option<&str>,
    format: Format,
) -> Result<()> {
    let policy = load_policy(policy_path)?;
    let pool = engine
        .pedigree()
        .opposite_sex_pool(target)
        .with_context(|| format!("Cannot build mate pool for animal {}", target))?;

    let mates = find_compatible_mates(engine, target, &pool, max_inbreeding, &policy)
        .context("Mate search failed")?;

    match format {
        Format::Json => print_json(&mates),
        Format::Text => {
            println!(
                "{} of {} candidates for {} at or below {:.2}% offspring inbreeding",
                mates.len(),
                pool.len(),
                target,
                max_inbreeding
            );
            println!("{:>12}  {:>10}  {:>8}", "candidate", "F (%)", "risk");
            for m in &mates {
                println!(
                    "{:>12}  {:>10.2}  {:>8}",
                    m.candidate_id, m.offspring_inbreeding_pct, m.risk
                );
            }
            Ok(())
        }
    }
}

fn display_parent(parent: Option<AnimalId>) -> String {
    parent.map_or_else(|| "unknown".to_string(), |id| id.to_string())
}

fn print_lineage(lineage: &Lineage) {
    if lineage.is_empty() {
        println!("  (none)");
    }
    for (label, ids) in lineage {
        println!("  {}: {:?}", label, ids);
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json_str = serde_json::to_string_pretty(value)?;
    println!("{}", json_str);
    Ok(())
}
