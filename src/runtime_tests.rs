//! Generated modules executed under Node against a minimal DOM. Skipped when
//! no `node` binary is on the path.

#[cfg(test)]
mod tests {
    use std::fs;
    use std::process::Command;

    use crate::compile::{compile, CompileMode, CompileOptions};

    /// Just enough DOM for the lifecycle: element and text nodes, child
    /// lists, attributes and listeners. `removeChild` throws on a node that
    /// is not a child, like the real one.
    const DOM: &str = r##"
class Node {
  constructor(name, data) {
    this.nodeName = name;
    this.data = data;
    this.childNodes = [];
    this.attributes = {};
    this.listeners = {};
  }
  appendChild(child) {
    this.childNodes.push(child);
    return child;
  }
  removeChild(child) {
    const index = this.childNodes.indexOf(child);
    if (index < 0) {
      throw new Error("removeChild: not a child");
    }
    this.childNodes.splice(index, 1);
    return child;
  }
  setAttribute(name, value) {
    this.attributes[name] = String(value);
  }
  addEventListener(type, listener) {
    (this.listeners[type] = this.listeners[type] || []).push(listener);
  }
  removeEventListener(type, listener) {
    this.listeners[type] = (this.listeners[type] || []).filter((l) => l !== listener);
  }
  dispatch(type) {
    for (const listener of this.listeners[type] || []) {
      listener();
    }
  }
  get textContent() {
    return this.nodeName === "#text"
      ? String(this.data)
      : this.childNodes.map((c) => c.textContent).join("");
  }
}
globalThis.document = {
  createElement: (name) => new Node(name),
  createTextNode: (data) => new Node("#text", data),
};
function mount() {
  const target = new Node("#root");
  const instance = component();
  instance.create(target);
  return { target, instance };
}
"##;

    /// Compile `source`, run `script` with the module imported as
    /// `component`, and return what it prints.
    fn run(source: &str, mode: CompileMode, script: &str) -> Option<String> {
        if Command::new("node").arg("--version").output().is_err() {
            eprintln!("node not available, skipping");
            return None;
        }
        let options = CompileOptions {
            mode,
            ..CompileOptions::default()
        };
        let code = compile(source, &options).unwrap().code;

        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("component.mjs"), &code).unwrap();
        fs::write(
            dir.path().join("main.mjs"),
            format!("import component from \"./component.mjs\";\n{}\n{}", DOM, script),
        )
        .unwrap();

        let output = Command::new("node")
            .arg("main.mjs")
            .current_dir(dir.path())
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "node failed:\n{}\n--- module ---\n{}",
            String::from_utf8_lossy(&output.stderr),
            code
        );
        Some(String::from_utf8(output.stdout).unwrap().trim().to_string())
    }

    fn client(source: &str, script: &str) -> Option<String> {
        run(source, CompileMode::Client, script)
    }

    #[test]
    fn test_counter_click_updates_text() {
        let out = client(
            "<script>let count = 0; function inc(){ count += 1; }</script><button on:click={inc}>{count}</button>",
            r#"
const { target } = mount();
target.childNodes[0].dispatch("click");
target.childNodes[0].dispatch("click");
console.log(target.textContent);
"#,
        );
        if let Some(out) = out {
            assert_eq!(out, "2");
        }
    }

    #[test]
    fn test_create_then_destroy_leaves_nothing_behind() {
        let out = client(
            "<script>let name = 'w'; let on = true; function toggle() { on = !on; }</script><div class={on}><p>Hello {name}</p><button on:click={toggle}>t</button></div>",
            r#"
const { target, instance } = mount();
const before = target.childNodes.length;
const div = target.childNodes[0];
const button = div.childNodes[1];
instance.destroy(target);
console.log(`${before} ${target.childNodes.length} ${div.childNodes.length} ${button.listeners.click.length}`);
"#,
        );
        if let Some(out) = out {
            assert_eq!(out, "1 0 0 0");
        }
    }

    #[test]
    fn test_script_names_shared_with_generated_code() {
        let out = client(
            "<script>let target = 'hello'; let p_1 = 5;</script><p>{target}-{p_1}</p>",
            r#"
const { target } = mount();
console.log(target.textContent);
"#,
        );
        if let Some(out) = out {
            assert_eq!(out, "hello-5");
        }
    }

    #[test]
    fn test_top_level_mutation_before_later_bindings() {
        let out = client(
            "<script>let a = 0; a = 1; let b = 2; $: c = a + b;</script><p>{c}</p>",
            r#"
const { target } = mount();
console.log(target.textContent);
"#,
        );
        if let Some(out) = out {
            assert_eq!(out, "3");
        }
    }

    #[test]
    fn test_closure_dependency_refreshes_text() {
        let out = client(
            "<script>let items = [1, 2]; let factor = 2; function bump() { factor++; }</script><button on:click={bump}>{items.map(i => i * factor).join(\",\")}</button>",
            r#"
const { target } = mount();
const before = target.textContent;
target.childNodes[0].dispatch("click");
console.log(`${before}|${target.textContent}`);
"#,
        );
        if let Some(out) = out {
            assert_eq!(out, "2,4|3,6");
        }
    }

    #[test]
    fn test_updates_resume_after_a_reactive_block_throws() {
        let out = client(
            "<script>let n = 0; $: if (n === 1) { throw new Error(\"boom\"); } function inc() { n++; }</script><button on:click={inc}>{n}</button>",
            r#"
const { target } = mount();
const button = target.childNodes[0];
let failed = false;
try {
  button.dispatch("click");
} catch (e) {
  failed = e.message === "boom";
}
button.dispatch("click");
console.log(`${failed} ${target.textContent}`);
"#,
        );
        if let Some(out) = out {
            assert_eq!(out, "true 2");
        }
    }

    #[test]
    fn test_server_render_calls_setup_from_if_block() {
        let out = run(
            "<script>let n = 0; const setup = () => { n = 5; }; if (true) { setup(); }</script><p>{n}</p>",
            CompileMode::Server,
            "console.log(component());",
        );
        if let Some(out) = out {
            assert_eq!(out, "<p>5<!----></p>");
        }
    }

    #[test]
    fn test_server_renders_placeholder_for_empty_interpolation() {
        let out = run(
            "<script>let s = '';</script><p>{s}<b>x</b></p>",
            CompileMode::Server,
            "console.log(component());",
        );
        if let Some(out) = out {
            assert_eq!(out, "<p>\u{200b}<!----><b>x<!----></b></p>");
        }
    }
}
