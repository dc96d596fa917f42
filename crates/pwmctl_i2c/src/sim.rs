//!Simulated I2C buses for testing
//!
//! `SimProvider` stands in for the i2c-dev driver. Every slave is a flat 256 byte register file, every transaction is logged, and failures can be injected. Clones share state, so a test can keep one clone for inspection while a `BusDevice` owns the other.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard},
};

use pwmctl_core::error::TransportError;

use crate::bus::{BusProvider, I2cBus};

const ENXIO: i32 = 6;
const EBADF: i32 = 9;
const EREMOTEIO: i32 = 121;

///A single logged bus operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimTransaction {
    Open { path: String },
    Select { address: u8 },
    Read { address: u8, register: u8 },
    Write { address: u8, register: u8, value: u8 },
    Close { path: String },
}

#[derive(Default)]
struct SimState {
    buses: HashSet<String>,
    registers: HashMap<u8, [u8; 256]>,
    transactions: Vec<SimTransaction>,
    open_handles: usize,
    transfers_until_failure: Option<usize>,
    fail_select: bool,
    fail_next_close: bool,
}

#[derive(Clone, Default)]
pub struct SimProvider {
    state: Arc<Mutex<SimState>>,
}

impl SimProvider {
    pub fn new() -> Self {
        Self::default()
    }

    ///Makes `path` openable.
    pub fn with_bus(self, path: &str) -> Self {
        self.state().buses.insert(path.to_string());
        self
    }

    ///Attaches a slave at the 7 bit `address` with all registers zeroed.
    pub fn with_device(self, address: u8) -> Self {
        self.state().registers.insert(address, [0u8; 256]);
        self
    }

    pub fn register(&self, address: u8, register: u8) -> u8 {
        self.state()
            .registers
            .get(&address)
            .map(|regs| regs[register as usize])
            .unwrap_or(0)
    }

    pub fn set_register(&self, address: u8, register: u8, value: u8) {
        if let Some(regs) = self.state().registers.get_mut(&address) {
            regs[register as usize] = value;
        }
    }

    pub fn transactions(&self) -> Vec<SimTransaction> {
        self.state().transactions.clone()
    }

    pub fn clear_transactions(&self) {
        self.state().transactions.clear();
    }

    ///`(register, value)` of every logged write, in order.
    pub fn writes(&self) -> Vec<(u8, u8)> {
        self.state()
            .transactions
            .iter()
            .filter_map(|t| match t {
                SimTransaction::Write {
                    register, value, ..
                } => Some((*register, *value)),
                _ => None,
            })
            .collect()
    }

    ///Number of handles opened and not yet closed.
    pub fn open_handles(&self) -> usize {
        self.state().open_handles
    }

    ///Lets `count` more reads/writes succeed, then fails every transfer until `restore_transfers`.
    pub fn fail_transfers_after(&self, count: usize) {
        self.state().transfers_until_failure = Some(count);
    }

    pub fn restore_transfers(&self) {
        self.state().transfers_until_failure = None;
    }

    ///Makes slave address selection fail, as it does on a bus whose adapter was removed.
    pub fn fail_select(&self, fail: bool) {
        self.state().fail_select = fail;
    }

    pub fn fail_next_close(&self) {
        self.state().fail_next_close = true;
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl BusProvider for SimProvider {
    type Bus = SimBus;

    fn open(&self, path: &str) -> Result<SimBus, TransportError> {
        let mut state = self.state();
        if !state.buses.contains(path) {
            return Err(TransportError::new(Some(2), "No such file or directory"));
        }
        state.open_handles += 1;
        state.transactions.push(SimTransaction::Open {
            path: path.to_string(),
        });
        Ok(SimBus {
            path: path.to_string(),
            address: None,
            sim: self.clone(),
        })
    }
}

pub struct SimBus {
    path: String,
    address: Option<u8>,
    sim: SimProvider,
}

impl SimBus {
    fn transfer<T>(
        &mut self,
        transaction: SimTransaction,
        op: impl FnOnce(&mut [u8; 256]) -> T,
    ) -> Result<T, TransportError> {
        let mut state = self.sim.state();
        state.transactions.push(transaction);
        let remaining = state.transfers_until_failure;
        match remaining {
            Some(0) => return Err(TransportError::new(Some(EREMOTEIO), "Remote I/O error")),
            Some(n) => state.transfers_until_failure = Some(n - 1),
            None => {}
        }
        let address = self
            .address
            .ok_or_else(|| TransportError::new(Some(ENXIO), "No such device or address"))?;
        match state.registers.get_mut(&address) {
            Some(regs) => Ok(op(regs)),
            None => Err(TransportError::new(Some(EREMOTEIO), "Remote I/O error")),
        }
    }
}

impl I2cBus for SimBus {
    fn set_slave_address(&mut self, address: u8) -> Result<(), TransportError> {
        let mut state = self.sim.state();
        state.transactions.push(SimTransaction::Select { address });
        if state.fail_select {
            return Err(TransportError::new(Some(ENXIO), "No such device or address"));
        }
        self.address = Some(address);
        Ok(())
    }

    fn read_byte_data(&mut self, register: u8) -> Result<u8, TransportError> {
        let address = self.address.unwrap_or_default();
        self.transfer(SimTransaction::Read { address, register }, |regs| {
            regs[register as usize]
        })
    }

    fn write_byte_data(&mut self, register: u8, value: u8) -> Result<(), TransportError> {
        let address = self.address.unwrap_or_default();
        self.transfer(
            SimTransaction::Write {
                address,
                register,
                value,
            },
            |regs| regs[register as usize] = value,
        )
    }

    fn close(self) -> Result<(), TransportError> {
        let mut state = self.sim.state();
        state.open_handles = state.open_handles.saturating_sub(1);
        state.transactions.push(SimTransaction::Close {
            path: self.path.clone(),
        });
        if state.fail_next_close {
            state.fail_next_close = false;
            return Err(TransportError::new(Some(EBADF), "Bad file descriptor"));
        }
        Ok(())
    }
}
