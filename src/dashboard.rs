use colored::Colorize;
use std::sync::mpsc::{channel, Sender};
use std::thread;
use std::thread::JoinHandle;
use thousands::Separable;

pub type StatusUpdateSender = Sender<StatusUpdate>;

#[derive(Clone, Debug)]
pub enum StatusUpdate {
    Message(String),
    /// A recovered numerical problem: the affected value was replaced and the run continues
    Warning(String),
    Progress {
        rapidity: f64,
        max_rapidity: f64,
        step: f64,
    },
    Derivative {
        r: f64,
        lo: f64,
        nlo: f64,
        amplitude: f64,
    },
    VegasPass {
        r: f64,
        pass: usize,
        result: f64,
        error: f64,
        chi_sq: f64,
        evaluations: usize,
    },
}

pub struct Dashboard {
    pub status_update_sender: StatusUpdateSender,
    printer: Option<JoinHandle<()>>,
}

impl Dashboard {
    /// Spawn the printer thread. Progress lines and Vegas passes are only shown when `verbose` is set.
    pub fn new(verbose: bool) -> Dashboard {
        let (log_sender, log_receiver) = channel();

        let printer = thread::spawn(move || {
            for update in log_receiver {
                match update {
                    StatusUpdate::Message(m) => println!("{}", m),
                    StatusUpdate::Warning(m) => eprintln!("{} {}", "Warning:".yellow().bold(), m),
                    StatusUpdate::Progress {
                        rapidity,
                        max_rapidity,
                        step,
                    } => {
                        if verbose {
                            println!(
                                "# Evolved up to {:.4}/{}, h={:.4e}",
                                rapidity, max_rapidity, step
                            );
                        }
                    }
                    StatusUpdate::Derivative {
                        r,
                        lo,
                        nlo,
                        amplitude,
                    } => println!("{:e} {:e} {:e} {:e}", r, lo, nlo, amplitude),
                    StatusUpdate::VegasPass {
                        r,
                        pass,
                        result,
                        error,
                        chi_sq,
                        evaluations,
                    } => {
                        if verbose {
                            println!(
                                "# Vegas r={:e} pass {}: {:e} +- {:e}, chi^2/dof {:.3} ({} evaluations)",
                                r,
                                pass,
                                result,
                                error,
                                chi_sq,
                                evaluations.separate_with_spaces()
                            );
                        }
                    }
                }
            }
        });

        Dashboard {
            status_update_sender: log_sender,
            printer: Some(printer),
        }
    }

    /// Close the channel and wait until every queued update has been printed.
    /// All clones of the sender must be dropped before this returns.
    pub fn finish(self) {
        let Dashboard {
            status_update_sender,
            printer,
        } = self;
        drop(status_update_sender);
        if let Some(printer) = printer {
            let _ = printer.join();
        }
    }
}
