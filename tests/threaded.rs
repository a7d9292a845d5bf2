use std::sync::Arc;
use std::thread;

use reqfilter::{Forest, Program, Request, RequestBackend, Tree, Vm};

fn admin_program() -> Program {
    // (path starts with /admin and cookie role=admin) or header x-internal exists
    let mut tree = Tree::named("allow");
    tree.add_or();
    tree.add_child_and();
    tree.add_child_op("startsWithPath", &["/admin"]);
    tree.add_op("equalCookie", &["role", "admin"]);
    tree.parent();
    tree.add_op("existsHeader", &["x-internal"]);

    Program::compile(&Forest::new().with(tree)).unwrap()
}

#[test]
fn evaluate_across_threads() {
    let program = Arc::new(admin_program());

    let requests = vec![
        // Admin with the right cookie -> allowed
        Request::new("GET").path("/admin/users").cookie("role", "admin"),
        // Admin path, wrong role -> denied
        Request::new("GET").path("/admin/users").cookie("role", "guest"),
        // Internal caller -> allowed
        Request::new("POST").path("/jobs").header("X-Internal", "1"),
        // Nothing matches -> denied
        Request::new("GET").path("/"),
    ];

    let handles: Vec<_> = requests
        .into_iter()
        .map(|request| {
            let program = Arc::clone(&program);
            thread::spawn(move || {
                let mut vm = Vm::new(RequestBackend::new(&request), &program);
                let first = vm.run_named("allow");
                let second = vm.run_named("allow");
                assert_eq!(first, second);
                first
            })
        })
        .collect();

    let results: Vec<Option<bool>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(results, [Some(true), Some(false), Some(true), Some(false)]);
}

#[test]
fn scoped_threads_share_a_borrowed_program() {
    let program = admin_program();
    let request = Request::new("GET").path("/admin").cookie("role", "admin");

    thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                let mut vm = Vm::new(RequestBackend::new(&request), &program);
                assert_eq!(vm.run_named("allow"), Some(true));
            });
        }
    });
}
