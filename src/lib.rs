use pyo3::prelude::*;
use pyo3::wrap_pymodule;
use watermass_core::python::core_module;

#[pymodule]
#[pyo3(name = "_lib")]
fn watermass(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    m.add_wrapped(wrap_pymodule!(core_module))?;

    set_path(m, "watermass._lib.core", "core")?;

    Ok(())
}

fn set_path(m: &Bound<'_, PyModule>, path: &str, module: &str) -> PyResult<()> {
    let code = format!(
        "\
import sys
sys.modules['{path}'] = {module}
    "
    );
    m.py().run_bound(&code, None, Some(&m.dict()))
}
