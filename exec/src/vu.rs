//! VU0 worker thread.
//!
//! Micro-programs run on their own thread against a private copy of the
//! VU register block. The main processor only ever observes the copy
//! after `finish_pending`, which is a full barrier.

use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread::{self, JoinHandle};

use eerec_core::{Error, MicroProgram, Result, VectorUnit, VuRegs};

struct Job {
    vu: VuRegs,
    start_pc: u32,
}

/// A `VectorUnit` backed by a dedicated thread.
pub struct VuWorker {
    jobs: Option<SyncSender<Job>>,
    done: Receiver<VuRegs>,
    /// A job was sent and its result not yet collected.
    pending: bool,
    join: Option<JoinHandle<()>>,
}

impl VuWorker {
    pub fn spawn(mut program: Box<dyn MicroProgram>) -> Result<Self> {
        let (tx_job, rx_job) = mpsc::sync_channel::<Job>(1);
        let (tx_done, rx_done) = mpsc::sync_channel::<VuRegs>(1);
        let join = thread::Builder::new()
            .name("vu0".into())
            .spawn(move || {
                for job in rx_job {
                    let mut vu = job.vu;
                    program.run(&mut vu, job.start_pc);
                    if tx_done.send(vu).is_err() {
                        break;
                    }
                }
            })
            .map_err(Error::Worker)?;

        Ok(Self {
            jobs: Some(tx_job),
            done: rx_done,
            pending: false,
            join: Some(join),
        })
    }

    /// Whether a micro-program may still be running.
    pub fn is_busy(&self) -> bool {
        self.pending
    }
}

impl VectorUnit for VuWorker {
    fn finish_pending(&mut self, vu: &mut VuRegs) {
        if !self.pending {
            return;
        }
        match self.done.recv() {
            Ok(state) => *vu = state,
            Err(_) => panic!("VU0 worker exited with a job in flight"),
        }
        self.pending = false;
    }

    fn start(&mut self, vu: &VuRegs, start_pc: u32) {
        assert!(!self.pending, "VU0 kicked while a micro-program is running");
        let Some(jobs) = &self.jobs else {
            unreachable!("VU0 worker already shut down");
        };
        tracing::trace!(start_pc, "VU0 kick");
        if jobs.send(Job { vu: *vu, start_pc }).is_err() {
            panic!("VU0 worker is gone");
        }
        self.pending = true;
    }
}

impl Drop for VuWorker {
    fn drop(&mut self) {
        // Closing the job channel ends the worker loop.
        self.jobs.take();
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                tracing::warn!("VU0 worker panicked");
            }
        }
    }
}
