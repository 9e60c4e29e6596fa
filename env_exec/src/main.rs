//! # Environment Logger Executable
//!
//! Samples the temperature and humidity of the lab at a fixed interval and writes them to a CSV
//! file in the session archive.

// -----------------------------------------------------------------------------------------------
// MODULES
// -----------------------------------------------------------------------------------------------

mod params;
mod sampler;
mod sensor;

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use color_eyre::{eyre::WrapErr, Result};
use log::info;
use std::thread;
use structopt::StructOpt;

use params::EnvExecParams;
use sensor::{EnvSensor, SimSensor};
use util::{
    archive::Archiver,
    host,
    logger::{logger_init, LevelFilter},
    session::Session,
};

// -----------------------------------------------------------------------------------------------
// STRUCTS
// -----------------------------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "env_exec", about = "Temperature and humidity logger")]
struct Opt {
    /// Number of samples, overriding the parameter file
    #[structopt(short = "n", long)]
    samples: Option<usize>,

    /// Seconds between samples, overriding the parameter file
    #[structopt(short, long)]
    interval: Option<u64>,

    /// Use a simulated sensor
    #[structopt(long)]
    simulated: bool,
}

// -----------------------------------------------------------------------------------------------
// MAIN
// -----------------------------------------------------------------------------------------------

fn main() -> Result<()> {
    color_eyre::install()?;

    let opt = Opt::from_args();

    // ---- EARLY INITIALISATION ----

    let session = Session::new("env_exec", "sessions")
        .wrap_err("Failed to create the session")?;

    logger_init(LevelFilter::Debug, &session)
        .wrap_err("Failed to initialise logging")?;

    info!("Jubilee Environment Logger\n");
    info!("Running on: {:#?}", host::get_host_info());
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let mut params: EnvExecParams = util::params::load("env_exec.toml")
        .wrap_err("Could not load env_exec params")?;

    if let Some(n) = opt.samples {
        params.num_samples = n;
    }
    if let Some(s) = opt.interval {
        params.sample_interval_s = s;
    }
    params.simulated |= opt.simulated;

    info!("Exec parameters loaded");

    // ---- SENSOR ----

    let mut sensor = build_sensor(&params).wrap_err("Could not initialise the sensor")?;

    let mut archiver = Archiver::from_session(&session, &params.output_file)
        .wrap_err("Could not create the CSV file")?;

    info!("Writing samples to {:?}", archiver.path());

    // ---- RUN ----

    let stats = sampler::run(&mut sensor, &mut archiver, &params, thread::sleep)
        .wrap_err("Could not write a sample")?;

    info!("{} samples logged, {} failed reads", stats.good, stats.failed);

    session.exit();

    Ok(())
}

// -----------------------------------------------------------------------------------------------
// FUNCTIONS
// -----------------------------------------------------------------------------------------------

#[cfg(target_arch = "arm")]
fn build_sensor(params: &EnvExecParams) -> Result<Box<dyn EnvSensor>> {
    if params.simulated {
        return Ok(Box::new(SimSensor::default()));
    }

    Ok(Box::new(sensor::Dht11::new(params.sensor_pin)?))
}

#[cfg(not(target_arch = "arm"))]
fn build_sensor(params: &EnvExecParams) -> Result<Box<dyn EnvSensor>> {
    if !params.simulated {
        log::warn!("The DHT11 sensor is only available on the Raspberry Pi, using a simulated sensor");
    }

    Ok(Box::new(SimSensor::default()))
}
