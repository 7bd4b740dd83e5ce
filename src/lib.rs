/*
 * This file is part of tbalancer.
 *
 * Copyright (C) 2025 tbalancer contributors
 *
 * tbalancer is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * tbalancer is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with tbalancer. If not, see <https://www.gnu.org/licenses/>.
 */

//! tbalancer - monitor for the T-Balancer bigNG fan controller
//!
//! The polling driver itself lives in `tb_core`. This crate adds the pieces
//! around it: configuration, the event journal, the fixed-interval monitor
//! loop, raw frame capture/replay and the command line.

pub mod capture;
pub mod cli;
pub mod config;
pub mod logger;
pub mod service;

#[cfg(test)]
pub mod test_utils;
