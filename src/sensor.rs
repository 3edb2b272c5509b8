//! Sensor node state and the physics behind it: super-capacitor charge,
//! energy drain over sense/idle cycles, recharge weight and acoustic power transfer.
//!
//! The physical constants live in [`EnergyModel`], shared by every node of a network,
//! while each [`SensorNode`] only carries its own state.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::point::Point;

/// Weight of a node at or below the critical voltage
pub const WEIGHT_LOW: u8 = 3;
/// Weight of a fully charged node
pub const WEIGHT_FULL: u8 = 10;

/// Physical parameters of the sensor nodes and of the acoustic link used to recharge them
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct EnergyModel {
    /// Super capacitor capacitance [F]
    pub capacitance: f64,
    /// Maximum capacitor voltage [V]
    pub v_max: f64,
    /// Minimum operating voltage [V]
    pub v_min: f64,
    /// Critical voltage, below which sensing fails [V]
    pub v_critical: f64,
    /// A node asks for a recharge once its voltage is at or below this [V]
    pub request_volt: f64,
    /// Voltage while sensing [V]
    pub v_sense: f64,
    /// Current while sensing [A]
    pub i_sense: f64,
    /// Current while idle [A]
    pub i_idle: f64,
    /// Sense cycle duration [s]
    pub sense_cycle: f64,
    /// Idle cycle duration [s]
    pub idle_cycle: f64,
    /// Communication cycle duration [s]
    pub comm_cycle: f64,
    /// Material coefficient of the acoustic channel loss
    pub alpha_mat: f64,
    /// Exponent applied to the angular frequency in the channel loss
    pub acous_exponent: f64,
    /// Acoustic carrier frequency [Hz]
    pub acous_frequency: f64,
    /// Piezo driver conversion efficiency
    pub eff_piezo: f64,
    /// Acoustic to DC conversion efficiency
    pub eff_acous2dc: f64,
    /// Energy emitted per acoustic transfer [J]
    pub acous_energy_send: f64,
    /// Beyond this distance no acoustic energy arrives [m]
    pub max_acous_dist: f64,
}
impl Default for EnergyModel {
    fn default() -> Self {
        Self {
            capacitance: 3.0,
            v_max: 5.0,
            v_min: 3.5,
            v_critical: 3.3,
            request_volt: 3.5,
            v_sense: 3.3,
            i_sense: 1.2e-3,
            i_idle: 4e-6,
            sense_cycle: 2e-3,
            idle_cycle: 9.498,
            comm_cycle: 0.5,
            alpha_mat: 3.21,
            acous_exponent: 8.58e-3,
            acous_frequency: 1.0e6,
            eff_piezo: 0.9,
            eff_acous2dc: 0.98,
            acous_energy_send: 12.0,
            max_acous_dist: 0.7,
        }
    }
}
impl EnergyModel {
    /// Voltage held by the capacitor for a given energy: `V = sqrt(2E / C)`
    pub fn update_voltage(&self, e: f64) -> f64 {
        (2.0 * e.max(0.0) / self.capacitance).sqrt()
    }

    /// Energy stored at a given voltage: `E = C V^2 / 2`
    pub fn update_energy(&self, v: f64) -> f64 {
        0.5 * self.capacitance * v * v
    }

    /// Energy when the capacitor sits at `v_max`
    pub fn calc_max_energy(&self) -> f64 {
        self.update_energy(self.v_max)
    }

    /// Energy left after `dt` seconds of alternating sense and idle cycles
    pub fn drain_energy(&self, dt: f64, e: f64) -> f64 {
        let v = self.update_voltage(e);
        let per_period = self.v_sense * self.i_sense * self.sense_cycle + v * self.i_idle * self.idle_cycle;
        let periods = dt.max(0.0) / (self.sense_cycle + self.idle_cycle);
        (e - per_period * periods).max(0.0)
    }

    /// Recharge priority for a voltage, graded from [`WEIGHT_LOW`] to [`WEIGHT_FULL`]
    pub fn update_weight(&self, v: f64) -> u8 {
        if v <= self.v_critical {
            WEIGHT_LOW
        } else if v >= self.v_max {
            WEIGHT_FULL
        } else {
            let step = (6.0 * (v - self.v_critical) / (self.v_max - self.v_critical)).floor() as u8;
            (WEIGHT_LOW + 1 + step).min(WEIGHT_FULL - 1)
        }
    }

    /// Energy received by a node `d` metres away from the emitting piezo.
    ///
    /// Channel loss is `g = exp(-ω^n · d · α)` with `ω = 2πf`; the emitted energy
    /// `E_t = η_piezo · g · E_send` is converted again on the receiving side,
    /// `E_r = η_piezo · η_dc · E_t`. Returns 0 when the node is out of range.
    pub fn acoustic_transfer(&self, d: f64) -> f64 {
        if !d.is_finite() || d < 0.0 || d > self.max_acous_dist {
            return 0.0;
        }
        let omega = 2.0 * PI * self.acous_frequency;
        let g = (-omega.powf(self.acous_exponent) * d * self.alpha_mat).exp();
        let e_sent = self.eff_piezo * g * self.acous_energy_send;
        self.eff_piezo * self.eff_acous2dc * e_sent
    }
}

/// A single sensor node of the network
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct SensorNode {
    /// Position of the node [m]
    pub pos: Point,
    /// Pressure sensor if true, temperature sensor otherwise
    pub pressure_sensor: bool,
    voltage: f64,
    energy: f64,
    weight: u8,
    fails: u32,
}
impl SensorNode {
    /// A node at `pos` charged to `voltage`; energy and weight are derived from it
    pub fn new(pos: Point, voltage: f64, pressure_sensor: bool, model: &EnergyModel) -> Self {
        let voltage = voltage.clamp(0.0, model.v_max);
        Self {
            pos,
            pressure_sensor,
            voltage,
            energy: model.update_energy(voltage),
            weight: model.update_weight(voltage),
            fails: 0,
        }
    }

    pub fn voltage(&self) -> f64 {
        self.voltage
    }

    pub fn energy(&self) -> f64 {
        self.energy
    }

    pub fn weight(&self) -> u8 {
        self.weight
    }

    pub fn fails(&self) -> u32 {
        self.fails
    }

    pub fn add_fail(&mut self) {
        self.fails += 1;
    }

    pub fn reset_fail(&mut self) {
        self.fails = 0;
    }

    /// True once the node failed more than `max_fails` times in a row.
    /// Escalation is up to the caller.
    pub fn is_unreachable(&self, max_fails: u32) -> bool {
        self.fails > max_fails
    }

    /// Whether this node is asking to be recharged
    pub fn needs_recharge(&self, model: &EnergyModel) -> bool {
        self.voltage <= model.request_volt
    }

    /// Energy needed to bring the node back to `v_max`
    pub fn calc_package(&self, model: &EnergyModel) -> f64 {
        0.5 * model.capacitance * (model.v_max.powi(2) - self.voltage.powi(2))
    }

    /// Overwrite the stored energy, keeping voltage and weight consistent
    pub fn set_energy(&mut self, energy: f64, model: &EnergyModel) {
        self.energy = energy.clamp(0.0, model.calc_max_energy());
        self.voltage = model.update_voltage(self.energy);
        self.weight = model.update_weight(self.voltage);
    }

    /// Simulate `dt` seconds of operation. A node that ends up below the critical
    /// voltage can no longer sense, which counts as a failure.
    pub fn tick(&mut self, dt: f64, model: &EnergyModel) {
        let drained = model.drain_energy(dt, self.energy);
        self.set_energy(drained, model);
        if self.voltage < model.v_critical {
            self.add_fail();
        }
    }

    /// Receive an acoustic transfer emitted `d` metres away, returning the energy gained
    pub fn receive_acoustic(&mut self, d: f64, model: &EnergyModel) -> f64 {
        let received = model.acoustic_transfer(d);
        if received > 0.0 {
            let before = self.energy;
            self.set_energy(self.energy + received, model);
            self.energy - before
        } else {
            0.0
        }
    }
}
