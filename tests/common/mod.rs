/*
    SPDX-License-Identifier: AGPL-3.0-or-later
    SPDX-FileCopyrightText: 2025 Shomy
*/
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io::{Error, ErrorKind, Result};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use vdmtool::Device;
use vdmtool::connection::Connection;
use vdmtool::connection::command::Command;
use vdmtool::connection::port::HpmPort;
use vdmtool::connection::regs;
use vdmtool::core::config::SessionConfig;
use vdmtool::core::poll::Sleeper;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Read(u8),
    Write(u8, Vec<u8>),
    Execute(u32),
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VdmBehavior {
    Ack,
    Reply(u32),
    Silent,
}

/// Register level model of an HPM chip.
#[derive(Debug)]
pub struct ChipState {
    pub ops: Vec<Op>,
    pub mode: String,
    /// Successive POWER_STATUS reads; the last value repeats.
    pub power_status: VecDeque<u8>,
    /// Result codes per opcode, consumed in order; 0 once exhausted.
    pub results: HashMap<u32, VecDeque<u8>>,
    pub debug_entry_sets_mode: bool,
    pub vdm: VdmBehavior,
    pub fail_execute: Option<Command>,
    /// Register whose reads fail at the transport level.
    pub fail_read: Option<u8>,
    /// Register whose writes fail at the transport level.
    pub fail_write: Option<u8>,
    /// Register that reads back zero bytes.
    pub empty_read: Option<u8>,
    vdm_toggle: u8,
    vdm_body: Vec<u8>,
    last_args: Vec<u8>,
    data1: u8,
}

impl ChipState {
    pub fn new(mode: &str, power_status: u8) -> Self {
        ChipState {
            ops: vec![],
            mode: mode.to_string(),
            power_status: VecDeque::from([power_status]),
            results: HashMap::new(),
            debug_entry_sets_mode: true,
            vdm: VdmBehavior::Ack,
            fail_execute: None,
            fail_read: None,
            fail_write: None,
            empty_read: None,
            vdm_toggle: 0x10,
            vdm_body: vec![0u8; 4],
            last_args: vec![],
            data1: 0,
        }
    }

    pub fn script(&mut self, cmd: Command, results: &[u8]) {
        self.results
            .entry(cmd.code())
            .or_default()
            .extend(results.iter().copied());
    }

    pub fn executed(&self) -> Vec<u32> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::Execute(cmd) => Some(*cmd),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, cmd: Command) -> usize {
        self.executed().iter().filter(|&&c| c == cmd.code()).count()
    }

    pub fn reads_of(&self, reg: u8) -> usize {
        self.ops.iter().filter(|op| **op == Op::Read(reg)).count()
    }

    /// Arguments written to DATA1, in order.
    pub fn args(&self) -> Vec<Vec<u8>> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::Write(reg, data) if *reg == regs::DATA1 => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    fn run(&mut self, cmd: u32) -> u8 {
        let result = self
            .results
            .get_mut(&cmd)
            .and_then(|q| q.pop_front())
            .unwrap_or(0);
        if result != 0 {
            return result;
        }

        if cmd == Command::Dbma.code() {
            match self.last_args.first().copied() {
                Some(1) if self.debug_entry_sets_mode => self.mode = String::from("DBMa"),
                Some(0) => self.mode = String::from("APP "),
                _ => {}
            }
        } else if cmd == Command::Vdms.code() {
            let header = u32::from_le_bytes([
                self.last_args[1],
                self.last_args[2],
                self.last_args[3],
                self.last_args[4],
            ]);
            let echoed = match self.vdm {
                VdmBehavior::Ack => Some(header | 0x40),
                VdmBehavior::Reply(word) => Some(word),
                VdmBehavior::Silent => None,
            };
            if let Some(word) = echoed {
                self.vdm_toggle = self.vdm_toggle.wrapping_add(1);
                self.vdm_body = word.to_le_bytes().to_vec();
                self.vdm_body.extend_from_slice(&[0xde, 0xad]);
            }
        }
        0
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedPort {
    pub state: Arc<Mutex<ChipState>>,
}

impl HpmPort for SimulatedPort {
    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.state.lock().unwrap().ops.push(Op::Close);
        Ok(())
    }

    fn read(&mut self, chip: u64, reg: u8, buf: &mut [u8]) -> Result<usize> {
        assert_eq!(chip, 0);
        let mut state = self.state.lock().unwrap();
        state.ops.push(Op::Read(reg));
        if state.fail_read == Some(reg) {
            return Err(Error::new(ErrorKind::Other, "remote I/O error"));
        }
        if state.empty_read == Some(reg) {
            return Ok(0);
        }

        let value: Vec<u8> = match reg {
            regs::MODE => {
                let mut v = state.mode.as_bytes().to_vec();
                v.resize(8, 0);
                v
            }
            regs::DATA1 => vec![state.data1, 0, 0, 0],
            regs::POWER_STATUS => {
                let v = if state.power_status.len() > 1 {
                    state.power_status.pop_front().unwrap()
                } else {
                    state.power_status[0]
                };
                vec![v]
            }
            regs::VDM_RX => {
                let mut v = vec![state.vdm_toggle];
                v.extend_from_slice(&state.vdm_body);
                v
            }
            _ => vec![],
        };

        let n = value.len().min(buf.len());
        buf[..n].copy_from_slice(&value[..n]);
        Ok(n)
    }

    fn write(&mut self, _chip: u64, reg: u8, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.ops.push(Op::Write(reg, data.to_vec()));
        if state.fail_write == Some(reg) {
            return Err(Error::new(ErrorKind::Other, "remote I/O error"));
        }
        if reg == regs::DATA1 {
            state.last_args = data.to_vec();
        }
        Ok(())
    }

    fn execute(&mut self, _chip: u64, cmd: u32, _flags: u32) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.ops.push(Op::Execute(cmd));
        if state.fail_execute.map(|c| c.code()) == Some(cmd) {
            return Err(Error::new(ErrorKind::Other, "status 0xe00002bc"));
        }
        state.data1 = state.run(cmd);
        // An argument is consumed by the command it was written for.
        state.last_args.clear();
        Ok(())
    }

    fn get_port_name(&self) -> String {
        String::from("simulated")
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper {
    pub sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl Sleeper for RecordingSleeper {
    fn sleep(&mut self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

pub struct Harness {
    pub device: Device,
    pub chip: Arc<Mutex<ChipState>>,
    pub sleeps: Arc<Mutex<Vec<Duration>>>,
}

pub fn harness(state: ChipState) -> Harness {
    let chip = Arc::new(Mutex::new(state));
    let sleeper = RecordingSleeper::default();
    let sleeps = Arc::clone(&sleeper.sleeps);
    let port = SimulatedPort {
        state: Arc::clone(&chip),
    };
    let device = Device::new(
        Connection::new(Box::new(port)),
        SessionConfig::default(),
        Box::new(sleeper),
    );
    Harness {
        device,
        chip,
        sleeps,
    }
}
