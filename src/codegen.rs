use std::collections::HashMap;

use inkwell::{
    builder::{Builder, BuilderError},
    context::Context,
    module::Module,
    types::BasicMetadataTypeEnum,
    values::{BasicMetadataValueEnum, FloatValue, FunctionValue},
    FloatPredicate,
};

use crate::ast::{ASTNode, Expression, Function, Prototype};

#[derive(Debug, thiserror::Error)]
pub enum CodegenError {
    #[error("unknown variable referenced {0}")]
    UnknownVariable(String),
    #[error("invalid binary operator {0:?}")]
    UnknownOperator(char),
    #[error("unknown function referenced {0}")]
    UnknownFunction(String),
    #[error("invalid number of args in call to {0}: expected {1} found {2}")]
    InvalidCall(String, usize, usize),
    #[error("call to {0} returned no value")]
    VoidCall(String),
    #[error("could not replace the body of function {0}")]
    InvalidRedefinition(String),
    #[error("failed to verify function {0}")]
    InvalidFunction(String),
    #[error(transparent)]
    Builder(#[from] BuilderError),
}

/// Lowers AST nodes into an LLVM module. One instance owns one module
/// and the insertion state that goes with it, so lowering is a method of
/// the instance rather than a free function over globals.
pub struct Codegen<'a> {
    pub context: &'a Context,
    pub module: Module<'a>,
    pub builder: Builder<'a>,
    named_values: HashMap<String, FloatValue<'a>>,
}

impl<'a> Codegen<'a> {
    pub fn new(context: &'a Context) -> Codegen<'a> {
        let module = context.create_module("kaleidoscope");
        let builder = context.create_builder();

        Codegen {
            context,
            module,
            builder,
            named_values: HashMap::new(),
        }
    }

    /// Every value in the language is an f64, so expression lowering
    /// always produces a `FloatValue` or fails.
    fn codegen_expr(&mut self, expr: &Expression) -> Result<FloatValue<'a>, CodegenError> {
        match expr {
            Expression::Number(value) => Ok(self.context.f64_type().const_float(*value)),
            Expression::Variable(name) => match self.named_values.get(name) {
                Some(&value) => Ok(value),
                None => Err(CodegenError::UnknownVariable(name.clone())),
            },
            Expression::Binary(op, left, right) => {
                let lhs = self.codegen_expr(left)?;
                let rhs = self.codegen_expr(right)?;

                match op {
                    '+' => Ok(self.builder.build_float_add(lhs, rhs, "tmpadd")?),
                    '-' => Ok(self.builder.build_float_sub(lhs, rhs, "tmpsub")?),
                    '*' => Ok(self.builder.build_float_mul(lhs, rhs, "tmpmul")?),
                    '<' => {
                        // fcmp makes an i1, which has to come back to the
                        // language's only type
                        let cmp = self.builder.build_float_compare(
                            FloatPredicate::ULT,
                            lhs,
                            rhs,
                            "tmpcmp",
                        )?;
                        Ok(self.builder.build_unsigned_int_to_float(
                            cmp,
                            self.context.f64_type(),
                            "tmpbool",
                        )?)
                    }
                    _ => Err(CodegenError::UnknownOperator(*op)),
                }
            }
            Expression::Call(callee, args) => {
                let function = self
                    .module
                    .get_function(callee)
                    .ok_or_else(|| CodegenError::UnknownFunction(callee.clone()))?;

                let expected = function.count_params() as usize;
                if expected != args.len() {
                    return Err(CodegenError::InvalidCall(
                        callee.clone(),
                        expected,
                        args.len(),
                    ));
                }

                let mut lowered: Vec<BasicMetadataValueEnum> = Vec::with_capacity(args.len());
                for arg in args {
                    lowered.push(self.codegen_expr(arg)?.into());
                }

                match self
                    .builder
                    .build_call(function, lowered.as_slice(), "tmp")?
                    .try_as_basic_value()
                    .left()
                {
                    Some(value) => Ok(value.into_float_value()),
                    None => Err(CodegenError::VoidCall(callee.clone())),
                }
            }
        }
    }

    /// Declares `proto` in the module, or returns the declaration that is
    /// already there. Redeclaring a known name is idempotent and the
    /// first-declared arity wins, even if `proto` disagrees.
    pub fn compile_proto(&self, proto: &Prototype) -> Result<FunctionValue<'a>, CodegenError> {
        if let Some(function) = self.module.get_function(&proto.name) {
            return Ok(function);
        }

        let param_types = std::iter::repeat(self.context.f64_type())
            .take(proto.params.len())
            .map(|f| f.into())
            .collect::<Vec<BasicMetadataTypeEnum>>();

        let fn_type = self.context.f64_type().fn_type(param_types.as_slice(), false);
        let function = self.module.add_function(proto.name.as_str(), fn_type, None);

        for (param, name) in function.get_param_iter().zip(&proto.params) {
            param.into_float_value().set_name(name);
        }

        Ok(function)
    }

    /// Lowers a full definition. A second definition of the same name
    /// replaces the old body; dropping only the basic blocks keeps calls
    /// already lowered against the function valid. If the body fails to
    /// lower or the result does not verify, the function is removed from
    /// the module so a later lookup cannot see a half-built one.
    pub fn compile_fn(&mut self, function: &Function) -> Result<FunctionValue<'a>, CodegenError> {
        let Function {
            prototype: proto,
            body,
        } = function;
        let llvm_func = self.compile_proto(proto)?;

        while let Some(block) = llvm_func.get_first_basic_block() {
            if unsafe { block.delete() }.is_err() {
                return Err(CodegenError::InvalidRedefinition(proto.name.clone()));
            }
        }

        let entry = self.context.append_basic_block(llvm_func, "entry");
        self.builder.position_at_end(entry);

        // the scope is flat: exactly this definition's parameters, bound
        // to the declared ones by position
        self.named_values.clear();
        self.named_values.reserve(proto.params.len());
        for (param, name) in llvm_func.get_param_iter().zip(&proto.params) {
            let param = param.into_float_value();
            param.set_name(name);
            self.named_values.insert(name.clone(), param);
        }

        let body = match self.codegen_expr(body) {
            Ok(value) => value,
            Err(err) => {
                unsafe { llvm_func.delete() };
                return Err(err);
            }
        };

        if let Err(err) = self.builder.build_return(Some(&body)) {
            unsafe { llvm_func.delete() };
            return Err(err.into());
        }

        if llvm_func.verify(true) {
            Ok(llvm_func)
        } else {
            unsafe { llvm_func.delete() };
            Err(CodegenError::InvalidFunction(proto.name.clone()))
        }
    }

    /// Lowers a whole parsed program in order, stopping at the first
    /// error. Everything lowered before the error stays in the module.
    pub fn codegen(&mut self, ast_nodes: &[ASTNode]) -> Result<(), CodegenError> {
        for node in ast_nodes {
            match node {
                ASTNode::Function(func) => self.compile_fn(func),
                ASTNode::Extern(proto) => self.compile_proto(proto),
            }?;
        }

        Ok(())
    }
}
