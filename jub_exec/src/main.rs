//! Main jubilee executable entry point.
//!
//! # Architecture
//!
//! - Initialise the session, logger and parameters
//! - Connect to the machine (or start the firmware simulator)
//! - Build the tool adapters and their devices
//! - Either run a command script, or run the interactive shell until `exit`
//! - Save a snapshot of the machine state into the session

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Result};
use log::{error, info, warn};
use rustyline::{error::ReadlineError, DefaultEditor};
use std::io;
use std::path::{Path, PathBuf};
use structopt::StructOpt;

// Internal
use comms_if::net::{HttpLink, MachineLink, SimLink};
use jub_lib::{
    motion_ctrl::MotionCtrl,
    params::JubExecParams,
    prompt::{FixedOperator, Operator, StdinOperator},
    servo_ctrl::{ServoDriver, ServoDriverKind, SimServo},
    teleop::{Teleop, TerminalKeys},
    tool::{
        camera::{RscamDevice, SimCamera},
        gripper::GripperParams,
        CameraDevice, CameraTool, Gripper, Micropipette,
    },
    workcell::{ShellError, ShellOutcome, Workcell},
};
use util::{
    host,
    logger::{logger_init, LevelFilter},
    script_interpreter::ScriptInterpreter,
    session::Session,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

const PROMPT: &str = "jubilee $ ";

/// Shell history, relative to the software root.
const HISTORY_PATH: &str = "sessions/jub_history.txt";

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "jub_exec", about = "Jubilee lab automation control")]
struct Opt {
    /// Use the built-in firmware simulator instead of a machine
    #[structopt(long)]
    simulated: bool,

    /// Run the commands in this script, then exit
    #[structopt(short, long, parse(from_os_str))]
    script: Option<PathBuf>,

    /// Answer yes to every operator question
    #[structopt(short = "y", long)]
    assume_yes: bool,

    /// Machine address, overriding the parameter file
    #[structopt(short, long)]
    address: Option<String>,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    color_eyre::install()?;

    let opt = Opt::from_args();

    // ---- EARLY INITIALISATION ----

    let session = Session::new("jub_exec", "sessions")
        .wrap_err("Failed to create the session")?;

    logger_init(LevelFilter::Debug, &session)
        .wrap_err("Failed to initialise logging")?;

    info!("Jubilee Executable\n");
    info!("Running on: {:#?}", host::get_host_info());
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let mut params: JubExecParams = util::params::load("jub_exec.toml")
        .wrap_err("Could not load jub_exec params")?;

    if opt.simulated {
        params.machine.simulated = true;
    }
    if let Some(ref address) = opt.address {
        params.machine.address = address.clone();
    }

    info!("Exec parameters loaded");

    // ---- CONNECT ----

    let link: Box<dyn MachineLink> = if params.machine.simulated {
        info!("Using the firmware simulator");
        Box::new(SimLink::new())
    } else {
        Box::new(HttpLink::new(&params.machine.address).wrap_err("Could not create the HTTP link")?)
    };

    let operator: Box<dyn Operator> = if opt.assume_yes {
        Box::new(FixedOperator::new(true))
    } else {
        Box::new(StdinOperator)
    };

    let machine = MotionCtrl::new(link, params.machine.clone(), operator)
        .wrap_err_with(|| format!("Could not connect to the machine at {}", params.machine.address))?;

    info!("Connected to {}", machine.link().address());

    // ---- TOOLS ----

    let camera_device: Box<dyn CameraDevice> = if params.machine.simulated {
        Box::new(SimCamera::new(params.camera.resolution))
    } else {
        Box::new(RscamDevice::new(params.camera.clone()))
    };
    let camera = CameraTool::new(params.camera.clone(), params.dock.clone(), camera_device);

    let servo = build_servo(&params.gripper, params.machine.simulated)
        .wrap_err("Could not initialise the gripper servo")?;
    let gripper = Gripper::new(params.gripper.clone(), params.dock.clone(), servo);

    let pipette = Micropipette::new(params.pipette.clone(), params.dock.clone());

    let mut workcell = Workcell::new(machine, camera, gripper, pipette);
    workcell.photo_dir = session.arch_root.clone();

    info!("Tools initialised");

    // ---- RUN ----

    let result = match opt.script {
        Some(ref path) => run_script(&mut workcell, &params, path),
        None => run_shell(&mut workcell, &params),
    };

    if let Err(ref e) = result {
        error!("{:?}", e);
    }

    // ---- SHUTDOWN ----

    session.save("machine_state.json", workcell.machine.state());
    workcell.machine.disconnect();

    session.exit();

    result
}

/// Run every command of a script, stopping at the first error.
fn run_script(
    workcell: &mut Workcell<Box<dyn MachineLink>>,
    params: &JubExecParams,
    path: &Path,
) -> Result<()> {
    let mut script = ScriptInterpreter::new(path)
        .wrap_err("Could not load the script")?;

    info!("Loaded script with {} commands", script.get_num_cmds());

    while let Some(cmd) = script.next_command() {
        info!("[line {}] {}", cmd.line, cmd.text);

        let outcome = workcell
            .execute_line(&cmd.text)
            .wrap_err_with(|| format!("Command on line {} failed", cmd.line))?;

        match outcome {
            ShellOutcome::Done(Some(text)) => info!("{}", text),
            ShellOutcome::Done(None) => (),
            ShellOutcome::Teleop => run_teleop(workcell, params)?,
            ShellOutcome::Exit => break,
        }
    }

    info!("Script complete");

    Ok(())
}

/// Run the interactive shell until `exit` or Ctrl-D.
fn run_shell(workcell: &mut Workcell<Box<dyn MachineLink>>, params: &JubExecParams) -> Result<()> {
    let history_path = host::get_sw_root()
        .map(|r| r.join(HISTORY_PATH))
        .unwrap_or_else(|_| PathBuf::from(HISTORY_PATH));

    let mut rl = DefaultEditor::new().wrap_err("Could not start the line editor")?;
    if rl.load_history(&history_path).is_err() {
        info!("No shell history found");
    }

    println!("Type `help` for the list of commands");

    loop {
        let line = match rl.readline(PROMPT) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                error!("Unhandled shell error: {}", e);
                break;
            }
        };

        if !line.trim().is_empty() {
            if let Err(e) = rl.add_history_entry(line.as_str()) {
                warn!("Could not add the line to the history: {}", e);
            }
        }

        match workcell.execute_line(&line) {
            Ok(ShellOutcome::Done(Some(text))) => println!("{}", text),
            Ok(ShellOutcome::Done(None)) => (),
            Ok(ShellOutcome::Teleop) => {
                if let Err(e) = run_teleop(workcell, params) {
                    error!("{:?}", e);
                }
            }
            Ok(ShellOutcome::Exit) => break,
            Err(ShellError::Parse(msg)) => println!("{}", msg),
            Err(e) if e.is_state_error() => warn!("{}", e),
            Err(e) => error!("{}", e),
        }
    }

    if let Err(e) = rl.save_history(&history_path) {
        warn!("Could not save the shell history: {}", e);
    }

    Ok(())
}

fn run_teleop(workcell: &mut Workcell<Box<dyn MachineLink>>, params: &JubExecParams) -> Result<()> {
    let mut keys = TerminalKeys::new().wrap_err("Could not put the terminal in raw mode")?;
    let mut teleop = Teleop::new(params.teleop.clone());

    teleop
        .run(&mut workcell.machine, &mut keys, &mut io::stdout())
        .wrap_err("Teleoperation failed")
}

/// Build the gripper servo driver.
fn build_servo(params: &GripperParams, simulated: bool) -> Result<Box<dyn ServoDriver>> {
    if simulated || params.driver == ServoDriverKind::Sim {
        return Ok(Box::new(SimServo::default()));
    }

    build_hw_servo(params)
}

#[cfg(target_arch = "arm")]
fn build_hw_servo(params: &GripperParams) -> Result<Box<dyn ServoDriver>> {
    use color_eyre::eyre::eyre;
    use jub_lib::servo_ctrl::{GpioServo, Pca9685Servo};
    use pwm_pca9685::Pca9685;

    match params.driver {
        ServoDriverKind::Pca9685 => {
            let i2c = rppal::i2c::I2c::new().wrap_err("Could not open the I2C bus")?;
            let board = Pca9685::new(i2c, params.pca9685_address)
                .map_err(|e| eyre!("Could not initialise the PCA9685: {:?}", e))?;
            let channel = pca9685_channel(params.pca9685_channel)
                .ok_or_else(|| eyre!("PCA9685 channel {} does not exist", params.pca9685_channel))?;

            Ok(Box::new(Pca9685Servo::new(board, channel)))
        }
        _ => Ok(Box::new(GpioServo::new(params.servo_pin))),
    }
}

#[cfg(not(target_arch = "arm"))]
fn build_hw_servo(params: &GripperParams) -> Result<Box<dyn ServoDriver>> {
    warn!(
        "{:?} servo driver is only available on the Raspberry Pi, using a simulated servo",
        params.driver
    );

    Ok(Box::new(SimServo::default()))
}

#[cfg(target_arch = "arm")]
fn pca9685_channel(channel: u8) -> Option<pwm_pca9685::Channel> {
    use pwm_pca9685::Channel::*;

    [C0, C1, C2, C3, C4, C5, C6, C7, C8, C9, C10, C11, C12, C13, C14, C15]
        .get(channel as usize)
        .copied()
}
