// SPDX-FileCopyrightText: © 2023 Technical University of Munich, Chair of Connected Mobility
// SPDX-FileCopyrightText: © 2023 Claudio Cicconetti <c.cicconetti@iit.cnr.it>
// SPDX-FileCopyrightText: © 2023 Siemens AG
// SPDX-License-Identifier: MIT

pub mod common;
pub mod component;
pub mod deployment;
pub mod entity;
pub mod function;
pub mod image_builder;
pub mod persistence;
pub mod resource;
pub mod tracker;
pub mod util;
