//! JSON rendering of live values for display.

use retrace_replay::{ObjRef, Object, Value};
use serde_json::{json, Value as JsonValue};

/// Render a value; shared objects already on the path print as a cycle marker
pub fn render(value: &Value) -> JsonValue {
    Renderer::default().value(value)
}

#[derive(Default)]
struct Renderer {
    path: Vec<usize>,
}

impl Renderer {
    fn value(&mut self, value: &Value) -> JsonValue {
        match value {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => json!(b),
            Value::Int(i) => i64::try_from(*i).map_or_else(|_| json!(i.to_string()), |n| json!(n)),
            Value::Float(f) => json!(f),
            Value::Str(s) => json!(s),
            Value::Path(p) => json!({ "path": p.display().to_string() }),
            Value::Address(a) => json!({
                "address": {
                    "scheme": a.scheme,
                    "netloc": a.netloc,
                    "path": a.path,
                    "params": a.params,
                    "query": a.query,
                    "fragment": a.fragment,
                }
            }),
            Value::Type(t) => json!({ "type": format!("{t:?}") }),
            Value::Thread(t) => json!({ "thread": t.name }),
            Value::Std(s) => json!({ "std": format!("{s:?}") }),
            Value::Ref(r) => self.object(r),
        }
    }

    fn values(&mut self, items: &[Value]) -> JsonValue {
        JsonValue::Array(items.iter().map(|v| self.value(v)).collect())
    }

    fn object(&mut self, r: &ObjRef) -> JsonValue {
        if self.path.contains(&r.addr()) {
            return json!("<cycle>");
        }
        self.path.push(r.addr());
        let out = self.object_body(r);
        self.path.pop();
        out
    }

    fn object_body(&mut self, r: &ObjRef) -> JsonValue {
        let drained = r.try_borrow_mut().and_then(|mut obj| match &mut *obj {
            Object::Cursor(c) => Some(c.to_list()),
            _ => None,
        });
        if let Some(items) = drained {
            return json!({ "cursor": self.values(&items) });
        }

        let Some(obj) = r.try_borrow() else {
            return json!("<busy>");
        };
        match &*obj {
            Object::List(items) => self.values(items),
            Object::Tuple(items) => json!({ "tuple": self.values(items) }),
            Object::Set(items) => json!({ "set": self.values(items) }),
            Object::KeyView(items) => json!({ "keys": self.values(items) }),
            Object::ValueView(items) => json!({ "values": self.values(items) }),
            Object::Map(entries) => {
                let pairs: Vec<JsonValue> = entries
                    .iter()
                    .map(|(k, v)| json!([self.value(k), self.value(v)]))
                    .collect();
                json!({ "map": pairs })
            }
            Object::Cursor(_) => json!({ "cursor": "<busy>" }),
            Object::Bytes(b) => json!({ "bytes": b.contents(), "position": b.position() }),
            Object::Text(t) => json!({ "text": t.contents(), "position": t.position() }),
            Object::File(f) => json!({
                "file": f.path.display().to_string(),
                "size": f.bytes.contents().len(),
                "position": f.bytes.position(),
            }),
            Object::Buffered(b) => {
                let inner = b.inner.clone();
                json!({ "buffered": format!("{:?}", b.direction), "inner": self.object(&inner) })
            }
            Object::DateTime(d) => json!({ "datetime": d.to_rfc3339() }),
            Object::Duration(d) => json!({ "duration_nanos": d.num_nanoseconds() }),
            Object::Exception(e) => json!({ "exception": e.class, "message": e.message }),
            Object::Enum(e) => json!({ "enum": e.class, "name": e.name, "value": self.value(&e.value) }),
            Object::Callable(c) => json!({ "callable": c.descriptor }),
            Object::Instance(i) => {
                let fields: serde_json::Map<String, JsonValue> = i
                    .fields
                    .iter()
                    .map(|(k, v)| (k.to_string(), self.value(v)))
                    .collect();
                json!({ "instance": i.class, "fields": fields })
            }
        }
    }
}
