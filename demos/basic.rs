use std::{env, process};

use chunkheap::{Arena, Config, Heap, Policy, SearchStart};

fn log_alloc(ptr: *mut u8, nbytes: usize) {
    println!("Requested {nbytes} bytes of memory");
    println!("Received this address: {ptr:?}");
}

fn main() {
    env_logger::init();

    // Usage: basic [first|best|worst] [head|rover]
    let mut args = env::args().skip(1);
    let policy = args.next().map_or(Ok(Policy::default()), |arg| arg.parse());
    let start = args.next().map_or(Ok(SearchStart::default()), |arg| arg.parse());

    let config = match (policy, start) {
        (Ok(policy), Ok(start)) => Config::system().with_policy(policy).with_start(start),
        (Err(err), _) | (_, Err(err)) => {
            eprintln!("{err}");
            process::exit(2);
        }
    };

    let mut heap = Heap::new(Arena::new(16, config.page_size), config);
    println!("Searching {} from the {}", config.policy, config.start);

    let mut blocks = Vec::new();
    for nbytes in [8, 16, 100, 3000, 24] {
        match heap.allocate(nbytes) {
            Ok(ptr) => {
                log_alloc(ptr.as_ptr(), nbytes);
                blocks.push(ptr);
            }
            Err(err) => eprintln!("{err}"),
        }
    }

    println!("{}", heap.dump());

    for ptr in blocks {
        unsafe { heap.release(ptr) };
    }

    println!("{}", heap.dump());
    println!("{}", heap.stats());
}
