use reqfilter::{FilterError, Forest, Program, Request, RequestBackend, Tree, Vm};

fn main() -> Result<(), FilterError> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    // isMethod(POST) and containsHeader(content-type, json)
    let mut json_post = Tree::named("json-post");
    json_post.add_and();
    json_post.add_child_op("isMethod", &["POST"]);
    json_post.add_op("containsHeader", &["content-type", "json"]);
    json_post.parent();
    json_post.add_op("printError", &["not a JSON post", "gate", "false"]);

    // existsCookie(session) or startsWithPath(/public/)
    let mut visible = Tree::named("visible");
    visible.add_or();
    visible.add_child_op("existsCookie", &["session"]);
    visible.add_op("startsWithPath", &["/public/"]);

    let program = Program::compile(&Forest::new().with(json_post).with(visible))?;
    println!("{program}");
    println!("{}", program.disassemble());

    let requests = [
        Request::new("POST")
            .path("/public/upload")
            .header("Content-Type", "application/json"),
        Request::new("GET").path("/account").cookie("session", "s1"),
        Request::new("PUT").path("/private"),
    ];

    for request in &requests {
        let mut vm = Vm::new(RequestBackend::new(request), &program);
        for (name, _) in program.entries() {
            let verdict = vm.run_named(name).unwrap_or(false);
            println!("{} {}: {name} = {verdict}", request.method_str(), request.path_str());
        }
    }

    Ok(())
}
