// Copyright (c) 2026 the Kerf developers.  Licensed under the Apache License,
// Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at
// your option. This file may not be copied, modified, or distributed except
// according to those terms.

use std::{env, fs};
use kerf::eval::Executor;
use kerf::laser::LaserExec;
use kerf::param::ParameterStore;
use kerf::parse::Parser;

fn main() {
    let filename = env::args().nth(1).expect("file name required");
    let input = fs::read_to_string(&filename).unwrap();

    let parser = Parser::new(LaserExec::dialect().word_letters());
    let mut params = ParameterStore::new();
    for (i, line) in input.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed == "%" {
            continue;
        }
        match parser.parse_line(&params, line, &filename, i + 1) {
            Err(e) => eprintln!("{}", e),
            Ok(parsed) => {
                params.commit(&parsed);
                println!("{:?}", parsed);
            }
        }
    }
}
