// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Ready-made [`TestRun`] implementations.
//!
//! [`TestRun`]: crate::TestRun

pub mod console;
pub mod out;
pub mod record;

#[doc(inline)]
pub use self::{
    console::{Coloring, Console, Stats},
    out::{Styles, WritableString},
    record::{Record, RunEvent},
};
