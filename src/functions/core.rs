use crate::context::Context;
use crate::error::RegistryError;
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A boxed argument or return value passed through the registry.
pub type Arg = Box<dyn Any + Send>;

/// Box a value as an [`Arg`].
pub fn arg<T: Any + Send>(value: T) -> Arg {
    Box::new(value)
}

/// Declared type of one parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    type_id: Option<TypeId>,
    type_name: &'static str,
}

impl ParamSpec {
    #[must_use]
    pub fn of<T: Any>() -> Self {
        Self {
            type_id: Some(TypeId::of::<T>()),
            type_name: type_name::<T>(),
        }
    }

    /// Accepts any argument.
    #[must_use]
    pub fn any() -> Self {
        Self {
            type_id: None,
            type_name: "any",
        }
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    fn accepts(&self, value: &Arg) -> bool {
        self.type_id.map_or(true, |id| (**value).type_id() == id)
    }
}

/// One declared return slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnSpec {
    /// An ordinary value of the named type
    Value(&'static str),
    /// The error slot
    Error,
}

impl ReturnSpec {
    #[must_use]
    pub fn value<T: Any>() -> Self {
        ReturnSpec::Value(type_name::<T>())
    }
}

/// Parameter and return shape of an extension function.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Signature {
    pub params: Vec<ParamSpec>,
    /// Type of trailing variadic arguments, if any
    pub variadic: Option<ParamSpec>,
    pub returns: Vec<ReturnSpec>,
}

impl Signature {
    /// One value, or one value followed by one error.
    #[must_use]
    pub fn is_valid_extension(&self) -> bool {
        matches!(
            self.returns.as_slice(),
            [ReturnSpec::Value(_)] | [ReturnSpec::Value(_), ReturnSpec::Error]
        )
    }

    fn check_args(&self, name: &str, args: &[Arg]) -> Result<(), RegistryError> {
        let fixed = self.params.len();
        let arity_ok = match self.variadic {
            Some(_) => args.len() >= fixed,
            None => args.len() == fixed,
        };
        if !arity_ok {
            return Err(RegistryError::ArityMismatch {
                name: name.to_string(),
                expected: match self.variadic {
                    Some(_) => format!("at least {fixed}"),
                    None => fixed.to_string(),
                },
                got: args.len(),
            });
        }

        for (index, value) in args.iter().enumerate() {
            let Some(spec) = self.params.get(index).or(self.variadic.as_ref()) else {
                continue;
            };
            if !spec.accepts(value) {
                return Err(RegistryError::TypeMismatch {
                    name: name.to_string(),
                    index,
                    expected: spec.type_name,
                });
            }
        }
        Ok(())
    }
}

/// Result of invoking an extension function.
///
/// Mirrors the `(value, error)` convention: a function may return a partial value
/// alongside an error.
#[derive(Default)]
pub struct CallOutput {
    pub value: Option<Arg>,
    pub error: Option<anyhow::Error>,
}

impl fmt::Debug for CallOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallOutput")
            .field("has_value", &self.value.is_some())
            .field("error", &self.error)
            .finish()
    }
}

impl CallOutput {
    pub fn value<T: Any + Send>(value: T) -> Self {
        Self {
            value: Some(Box::new(value)),
            error: None,
        }
    }

    #[must_use]
    pub fn error(error: anyhow::Error) -> Self {
        Self {
            value: None,
            error: Some(error),
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    #[must_use]
    pub fn value_as<T: Any>(&self) -> Option<&T> {
        self.value.as_ref().and_then(|v| (**v).downcast_ref::<T>())
    }

    /// Take the value as `T`, failing on an error or a value of another type.
    pub fn into_result<T: Any>(self) -> anyhow::Result<T> {
        if let Some(err) = self.error {
            return Err(err);
        }
        match self.value.map(|v| v.downcast::<T>()) {
            Some(Ok(v)) => Ok(*v),
            Some(Err(_)) => Err(anyhow::anyhow!("extension returned a value that is not a {}", type_name::<T>())),
            None => Err(anyhow::anyhow!("extension returned no value")),
        }
    }
}

type Body = Arc<dyn Fn(&mut Context, Vec<Arg>) -> CallOutput + Send + Sync>;

fn unpack<T: Any>(slot: Option<Arg>) -> Result<T, CallOutput> {
    match slot.map(|a| a.downcast::<T>()) {
        Some(Ok(v)) => Ok(*v),
        _ => Err(CallOutput::error(anyhow::anyhow!(
            "argument is not a {}",
            type_name::<T>()
        ))),
    }
}

/// A function that can be registered in a [`FunctionRegistry`].
///
/// The typed constructors (`fn0`..`fn3`, `try_fn0`..`try_fn3`, [`variadic`](Self::variadic))
/// derive the [`Signature`] from the closure type, so their calling convention is
/// checked by the compiler. [`ExtensionFn::new`] takes an explicit signature, which
/// the registry validates at registration time.
#[derive(Clone)]
pub struct ExtensionFn {
    signature: Signature,
    body: Body,
}

impl fmt::Debug for ExtensionFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionFn")
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

macro_rules! typed_constructors {
    ($plain:ident, $fallible:ident; $($A:ident $a:ident),*) => {
        /// Wrap an infallible closure. Returns one value.
        #[allow(unused_mut, unused_variables)]
        pub fn $plain<$($A,)* R, F>(f: F) -> Self
        where
            $($A: Any + Send,)*
            R: Any + Send,
            F: Fn(&mut Context, $($A),*) -> R + Send + Sync + 'static,
        {
            let signature = Signature {
                params: vec![$(ParamSpec::of::<$A>()),*],
                variadic: None,
                returns: vec![ReturnSpec::value::<R>()],
            };
            Self::new(signature, move |ctx, args| {
                let mut slots = args.into_iter();
                $(
                    let $a = match unpack::<$A>(slots.next()) {
                        Ok(v) => v,
                        Err(out) => return out,
                    };
                )*
                CallOutput::value(f(ctx, $($a),*))
            })
        }

        /// Wrap a fallible closure. Returns one value and one error.
        #[allow(unused_mut, unused_variables)]
        pub fn $fallible<$($A,)* R, E, F>(f: F) -> Self
        where
            $($A: Any + Send,)*
            R: Any + Send,
            E: Into<anyhow::Error>,
            F: Fn(&mut Context, $($A),*) -> Result<R, E> + Send + Sync + 'static,
        {
            let signature = Signature {
                params: vec![$(ParamSpec::of::<$A>()),*],
                variadic: None,
                returns: vec![ReturnSpec::value::<R>(), ReturnSpec::Error],
            };
            Self::new(signature, move |ctx, args| {
                let mut slots = args.into_iter();
                $(
                    let $a = match unpack::<$A>(slots.next()) {
                        Ok(v) => v,
                        Err(out) => return out,
                    };
                )*
                match f(ctx, $($a),*) {
                    Ok(v) => CallOutput::value(v),
                    Err(e) => CallOutput::error(e.into()),
                }
            })
        }
    };
}

impl ExtensionFn {
    /// Wrap a raw body with an explicit signature.
    pub fn new<F>(signature: Signature, body: F) -> Self
    where
        F: Fn(&mut Context, Vec<Arg>) -> CallOutput + Send + Sync + 'static,
    {
        Self {
            signature,
            body: Arc::new(body),
        }
    }

    typed_constructors!(fn0, try_fn0;);
    typed_constructors!(fn1, try_fn1; A a);
    typed_constructors!(fn2, try_fn2; A a, B b);
    typed_constructors!(fn3, try_fn3; A a, B b, C c);

    /// Wrap a fallible closure taking any number of `A` arguments.
    pub fn variadic<A, R, E, F>(f: F) -> Self
    where
        A: Any + Send,
        R: Any + Send,
        E: Into<anyhow::Error>,
        F: Fn(&mut Context, Vec<A>) -> Result<R, E> + Send + Sync + 'static,
    {
        let signature = Signature {
            params: Vec::new(),
            variadic: Some(ParamSpec::of::<A>()),
            returns: vec![ReturnSpec::value::<R>(), ReturnSpec::Error],
        };
        Self::new(signature, move |ctx, args| {
            let mut values = Vec::with_capacity(args.len());
            for slot in args {
                match unpack::<A>(Some(slot)) {
                    Ok(v) => values.push(v),
                    Err(out) => return out,
                }
            }
            match f(ctx, values) {
                Ok(v) => CallOutput::value(v),
                Err(e) => CallOutput::error(e.into()),
            }
        })
    }

    #[must_use]
    pub fn signature(&self) -> &Signature {
        &self.signature
    }
}

/// Name to extension function map shared by every context of an
/// [`App`](crate::app::App).
///
/// Populated during startup and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, ExtensionFn>,
}

impl FunctionRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the builtin functions (`redirect`, `serve_data`, `flash`,
    /// `flash_messages`, `all_flash_messages`).
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for (name, function) in super::builtins::builtins() {
            registry.functions.insert(name.to_string(), function);
        }
        registry
    }

    /// Admit `function` under `name`.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::InvalidSignature`] unless the function returns one value, or
    ///   one value and one error
    /// - [`RegistryError::DuplicateFunction`] if the name is taken
    pub fn register(&mut self, name: &str, function: ExtensionFn) -> Result<(), RegistryError> {
        if !function.signature.is_valid_extension() {
            return Err(RegistryError::InvalidSignature {
                name: name.to_string(),
            });
        }
        if self.functions.contains_key(name) {
            return Err(RegistryError::DuplicateFunction(name.to_string()));
        }
        debug!(function = %name, params = function.signature.params.len(), "Extension function registered");
        self.functions.insert(name.to_string(), function);
        Ok(())
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ExtensionFn> {
        self.functions.get(name)
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Invoke `name` with boxed arguments after checking arity and argument types.
    pub fn call(
        &self,
        ctx: &mut Context,
        name: &str,
        args: Vec<Arg>,
    ) -> Result<CallOutput, RegistryError> {
        let function = self
            .functions
            .get(name)
            .ok_or_else(|| RegistryError::UnknownFunction(name.to_string()))?;
        function.signature.check_args(name, &args)?;
        Ok((function.body)(ctx, args))
    }
}
