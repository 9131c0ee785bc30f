use clap::{App, Arg, ArgMatches, SubCommand};
use color_eyre::{Report, Section};
use eyre::{bail, WrapErr};
use std::str::FromStr;
use std::time::Instant;

use nlobk::dashboard::{Dashboard, StatusUpdate};
use nlobk::dipole::{AmplitudeGrid, Dipole};
use nlobk::initial_condition;
use nlobk::solver::BkSolver;
use nlobk::Settings;

fn parse<T: FromStr>(value: &str, name: &str) -> Result<T, Report>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    T::from_str(value.trim_end_matches(','))
        .wrap_err_with(|| format!("Could not parse {} from '{}'", name, value))
}

fn inspect<'a>(solver: &BkSolver<Dipole>, matches: &ArgMatches<'a>) -> Result<(), Report> {
    let pt = match matches.values_of("point") {
        Some(values) => values
            .map(|x| parse::<f64>(x, "point"))
            .collect::<Result<Vec<_>, _>>()?,
        None => bail!("No point given"),
    };

    if pt.len() != 3 && pt.len() != 5 {
        return Err(eyre::eyre!(
            "The point should have 3 or 5 coordinates but it has {}",
            pt.len()
        ))
        .suggestion("Use r z theta, or r z theta z2 theta2 for the NLO kernels");
    }

    let (r, z, theta) = (pt[0], pt[1], pt[2]);
    let x = (r * r + z * z - 2. * r * z * theta.cos()).sqrt();
    println!("r={:e}, z={:e}, theta={}  =>  X={:e}, Y={:e}", r, z, theta, x, z);
    println!(
        "alpha_s(r)={:e}, alpha_s(X)={:e}, alpha_s(Y)={:e}",
        solver.alphas(r),
        solver.alphas(x),
        solver.alphas(z)
    );
    println!("K_lo={:e}", solver.kernel_lo(r, z, theta));

    if pt.len() == 5 {
        let (z2, theta2) = (pt[3], pt[4]);
        let x2 = (r * r + z2 * z2 - 2. * r * z2 * theta2.cos()).sqrt();
        let z_m_z2 = (z * z + z2 * z2 - 2. * z * z2 * (theta - theta2).cos()).sqrt();
        println!("X2={:e}, Y2={:e}, |z-z2|={:e}", x2, z2, z_m_z2);
        println!(
            "K_nlo={:e}, K_nlo_fermion={:e}",
            solver.kernel_nlo(r, x, z, x2, z2, z_m_z2),
            solver.kernel_nlo_fermion(r, x, z, x2, z2, z_m_z2)
        );
    }

    Ok(())
}

fn main() -> Result<(), Report> {
    color_eyre::install()?;

    let matches = App::new("NLO BK solver")
        .version("0.1")
        .about("Solve the Balitsky-Kovchegov equation at next-to-leading order")
        .arg(
            Arg::with_name("config")
                .short("f")
                .long("config")
                .value_name("CONFIG_FILE")
                .default_value("nlobk_config.yaml")
                .help("Set the configuration file"),
        )
        .arg(
            Arg::with_name("cores")
                .short("c")
                .long("cores")
                .value_name("NUMCORES")
                .help("Set the number of cores"),
        )
        .arg(
            Arg::with_name("maxy")
                .short("y")
                .long("maxy")
                .value_name("MAXY")
                .help("Evolve up to this rapidity"),
        )
        .arg(
            Arg::with_name("step")
                .short("s")
                .long("step")
                .value_name("STEP")
                .help("Rapidity step size"),
        )
        .arg(
            Arg::with_name("output")
                .short("o")
                .long("output")
                .value_name("OUTPUT_FILE")
                .help("Write the evolved amplitude to this file"),
        )
        .arg(
            Arg::with_name("checkpoint")
                .long("checkpoint")
                .value_name("CHECKPOINT_FILE")
                .help("Save the amplitude to this file after every rapidity step"),
        )
        .arg(
            Arg::with_name("resume")
                .long("resume")
                .value_name("CHECKPOINT_FILE")
                .help("Continue the evolution from a checkpoint"),
        )
        .arg(
            Arg::with_name("seed")
                .long("seed")
                .value_name("SEED")
                .help("Fix the Monte Carlo seed"),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Print the evolution progress"),
        )
        .subcommand(
            SubCommand::with_name("dndy")
                .about("Print r, dN/dy (LO), dN/dy (NLO) and N at the initial condition"),
        )
        .subcommand(
            SubCommand::with_name("inspect")
                .about("Evaluate the coupling and the kernels at a single point")
                .arg(
                    Arg::with_name("point")
                        .short("p")
                        .required(true)
                        .min_values(3)
                        .allow_hyphen_values(true),
                ),
        )
        .get_matches();

    let config = matches.value_of("config").unwrap_or("nlobk_config.yaml");
    let mut settings = Settings::from_file(config)?;

    let mut cores = 1;
    if let Some(x) = matches.value_of("cores") {
        cores = parse::<usize>(x, "cores")?;
    }

    if let Some(x) = matches.value_of("maxy") {
        settings.evolution.max_rapidity = parse(x, "maxy")?;
    }

    if let Some(x) = matches.value_of("step") {
        settings.evolution.step_size = parse(x, "step")?;
    }

    if let Some(x) = matches.value_of("output") {
        settings.general.output = x.to_owned();
    }

    if let Some(x) = matches.value_of("checkpoint") {
        settings.general.checkpoint = Some(x.to_owned());
    }

    if let Some(x) = matches.value_of("seed") {
        settings.integration.mc_seed = Some(parse(x, "seed")?);
    }

    if matches.is_present("verbose") {
        settings.general.verbose = true;
    }

    if matches.subcommand_matches("dndy").is_some() {
        settings.general.print_derivatives = true;
    }

    rayon::ThreadPoolBuilder::new()
        .num_threads(cores)
        .build_global()
        .wrap_err("Could not set up the thread pool")?;

    let dashboard = Dashboard::new(settings.general.verbose);

    let ic = initial_condition::from_settings(&settings.initial_condition);
    let dipole = match matches.value_of("resume") {
        Some(path) => Dipole::load(path, ic)?,
        None => Dipole::new(ic, &settings.grid)?,
    };

    let max_y = settings.evolution.max_rapidity;
    let output = settings.general.output.clone();
    let mut solver = BkSolver::new(settings, dipole, dashboard.status_update_sender.clone());

    if let Some(m) = matches.subcommand_matches("inspect") {
        inspect(&solver, m)?;
        drop(solver);
        dashboard.finish();
        return Ok(());
    }

    if matches.subcommand_matches("dndy").is_some() {
        let initial = solver.dipole().amplitudes_at(0).to_vec();
        solver.evolve(0., &initial)?;
        drop(solver);
        dashboard.finish();
        return Ok(());
    }

    let start = Instant::now();
    solver.solve(max_y)?;
    let dipole = solver.into_dipole();

    dipole.write_yaml(&output)?;
    dashboard
        .status_update_sender
        .send(StatusUpdate::Message(format!(
            "Evolved up to y={} in {:.2} s, {} rapidities written to {}",
            max_y,
            start.elapsed().as_secs_f64(),
            dipole.rapidities().len(),
            output
        )))
        .wrap_err("Could not send the final message")?;

    dashboard.finish();
    Ok(())
}
