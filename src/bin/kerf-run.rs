// Copyright (c) 2026 the Kerf developers.  Licensed under the Apache License,
// Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at
// your option. This file may not be copied, modified, or distributed except
// according to those terms.

use std::{env, fs};
use kerf::eval::{ControlAction, Interpreter, LineStream};
use kerf::laser::LaserExec;

fn main() {
    tracing_subscriber::fmt::init();

    let filename = env::args().nth(1).expect("file name required");
    let input = fs::read_to_string(&filename).unwrap();

    let mut interp = Interpreter::new(LaserExec::default());
    let mut stream = LineStream::new(&input, &filename);
    loop {
        let result = interp.run(&mut stream);
        for directive in interp.executor_mut().take_directives() {
            println!("{:?}", directive);
        }
        match result {
            Err(e) => {
                eprintln!("{}", e);
                break;
            }
            // Pauses just print in this demo; the program continues.
            Ok(Some(ControlAction::Pause)) | Ok(Some(ControlAction::OptionalPause)) => {
                println!("-- pause --");
            }
            Ok(_) => break,
        }
    }
}
