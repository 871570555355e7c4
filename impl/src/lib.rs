/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

#![allow(
    clippy::module_name_repetitions,
    clippy::similar_names,
    clippy::missing_errors_doc
)]

pub mod bit_op;
pub mod bytes_io;

#[doc(hidden)]
pub use byteorder;

#[doc(hidden)]
pub use semver;
