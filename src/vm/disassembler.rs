//! Bytecode disassembler for debug output.

use crate::interpreter::value::Value;
use crate::vm::code;
use crate::vm::compiler::Bytecode;

/// Disassemble a bytecode artifact: the top-level instruction stream
/// followed by every compiled function in the constant pool.
pub fn disassemble_bytecode(bytecode: &Bytecode) -> String {
    let mut out = String::new();
    out.push_str("== <main> ==\n");
    out.push_str(&code::disassemble(&bytecode.instructions));

    for (index, constant) in bytecode.constants.iter().enumerate() {
        if let Value::CompiledFunction(func) = constant {
            out.push_str(&format!(
                "\n== fn @{} (locals={}, params={}) ==\n",
                index, func.num_locals, func.num_params
            ));
            out.push_str(&code::disassemble(&func.instructions));
        }
    }
    out
}
